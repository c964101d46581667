use super::Error;

/// Error raised when the API is used in a way that can never succeed.
///
/// This occurs when:
/// - An unknown condition operator is supplied
/// - A query method is called in a mode that has no use for it (fields on delete)
/// - A reference or field name collides with one already defined
///
/// These errors surface at call time so the mistake points at the call site,
/// not at a later render or execution step.
#[derive(Debug)]
pub(super) struct ConfigurationError {
    message: Box<str>,
}

impl std::error::Error for ConfigurationError {}

impl core::fmt::Display for ConfigurationError {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(f, "invalid configuration: {}", self.message)
    }
}

impl Error {
    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Error {
        Error::from(super::ErrorKind::Configuration(ConfigurationError {
            message: message.into().into(),
        }))
    }

    /// Returns `true` if this error is a configuration error.
    pub fn is_configuration(&self) -> bool {
        matches!(self.kind(), super::ErrorKind::Configuration(_))
    }
}
