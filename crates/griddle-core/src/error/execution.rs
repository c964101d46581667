use super::Error;

/// Error from the database layer while executing a statement.
///
/// Carries the rendered SQL so a failure found in a log can be reproduced.
#[derive(Debug)]
pub(super) struct ExecutionError {
    query: Box<str>,
    inner: Box<dyn std::error::Error + Send + Sync>,
}

impl std::error::Error for ExecutionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.inner.as_ref())
    }
}

impl core::fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        // Display the error and walk its source chain
        core::fmt::Display::fmt(&self.inner, f)?;
        let mut source = self.inner.source();
        while let Some(err) = source {
            write!(f, ": {}", err)?;
            source = err.source();
        }
        write!(f, " (query: {})", self.query)
    }
}

impl Error {
    /// Creates an error from a failed statement execution.
    ///
    /// This is the preferred way to convert driver-specific errors (rusqlite
    /// and friends) into griddle errors.
    pub fn execution(
        query: impl Into<String>,
        err: impl std::error::Error + Send + Sync + 'static,
    ) -> Error {
        Error::from(super::ErrorKind::Execution(ExecutionError {
            query: query.into().into(),
            inner: Box::new(err),
        }))
    }

    /// Returns `true` if this error is an execution error.
    pub fn is_execution(&self) -> bool {
        matches!(self.kind(), super::ErrorKind::Execution(_))
    }
}
