use super::Error;

/// Error when a value does not match the format its field type requires.
///
/// Raised by typecasting when loading or saving, for example a date column
/// holding a string that does not parse, or a money value that is not numeric.
#[derive(Debug)]
pub(super) struct FormatError {
    message: Box<str>,
}

impl std::error::Error for FormatError {}

impl core::fmt::Display for FormatError {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(f, "invalid format: {}", self.message)
    }
}

impl Error {
    /// Creates an invalid format error.
    pub fn invalid_format(message: impl Into<String>) -> Error {
        Error::from(super::ErrorKind::Format(FormatError {
            message: message.into().into(),
        }))
    }

    /// Returns `true` if this error is an invalid format error.
    pub fn is_invalid_format(&self) -> bool {
        matches!(self.kind(), super::ErrorKind::Format(_))
    }
}
