use super::Error;

/// Error when an operation is valid in general but not for this backend.
///
/// The array persistence raises this for raw SQL expressions and for id
/// values it cannot index by. Drivers raise it for statements their engine
/// has no equivalent for.
#[derive(Debug)]
pub(super) struct UnsupportedError {
    message: Box<str>,
}

impl std::error::Error for UnsupportedError {}

impl core::fmt::Display for UnsupportedError {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(f, "unsupported: {}", self.message)
    }
}

impl Error {
    /// Creates an unsupported operation error.
    pub fn unsupported(message: impl Into<String>) -> Error {
        Error::from(super::ErrorKind::Unsupported(UnsupportedError {
            message: message.into().into(),
        }))
    }

    /// Returns `true` if this error is an unsupported operation error.
    pub fn is_unsupported(&self) -> bool {
        matches!(self.kind(), super::ErrorKind::Unsupported(_))
    }
}
