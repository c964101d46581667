use super::Error;

/// A free-form error message, created by the `err!` and `bail!` macros.
#[derive(Debug)]
pub(super) struct AdhocError {
    message: Box<str>,
}

impl std::error::Error for AdhocError {}

impl core::fmt::Display for AdhocError {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.write_str(&self.message)
    }
}

impl Error {
    /// Creates an error from format arguments.
    ///
    /// Prefer the `err!` and `bail!` macros over calling this directly.
    pub fn from_args(args: core::fmt::Arguments<'_>) -> Error {
        Error::from(super::ErrorKind::Adhoc(AdhocError {
            message: match args.as_str() {
                Some(s) => s.into(),
                None => args.to_string().into(),
            },
        }))
    }

    /// Creates an error from a plain message.
    pub fn msg(message: impl Into<String>) -> Error {
        Error::from(super::ErrorKind::Adhoc(AdhocError {
            message: message.into().into(),
        }))
    }
}
