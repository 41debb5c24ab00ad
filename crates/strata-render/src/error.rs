//! Render errors.

/// Error produced by a render function or boundary resolver.
///
/// Where the error escapes decides its severity: outside every boundary
/// it fails the whole request (classification error, nothing cached);
/// inside a boundary it is contained to that hole's placeholder.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    /// The render function failed.
    #[error("render failed: {0}")]
    Failed(String),

    /// An upstream fetch inside the render failed.
    #[error("fetch failed: {0}")]
    Fetch(#[from] anyhow::Error),
}

impl RenderError {
    /// Create a failure with a message.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}
