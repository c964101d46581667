use super::Error;

/// Error when a template cannot be rendered into SQL.
///
/// This occurs when:
/// - A tag in the template has no matching argument and no handler
/// - Bracket nesting exceeds the recursion limit
/// - A clause is empty where the statement requires content (update with no set)
#[derive(Debug)]
pub(super) struct RenderError {
    message: Box<str>,
}

impl std::error::Error for RenderError {}

impl core::fmt::Display for RenderError {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(f, "render failed: {}", self.message)
    }
}

impl Error {
    /// Creates a render error.
    pub fn render(message: impl Into<String>) -> Error {
        Error::from(super::ErrorKind::Render(RenderError {
            message: message.into().into(),
        }))
    }

    /// Returns `true` if this error is a render error.
    pub fn is_render(&self) -> bool {
        matches!(self.kind(), super::ErrorKind::Render(_))
    }
}
