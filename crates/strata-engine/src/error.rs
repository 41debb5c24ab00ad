//! Engine errors.

use strata_revalidate::RegenError;
use strata_stream::AssemblerError;

use crate::phase::RenderPhase;

/// Orchestration errors. A classification error means the render
/// function failed outside every boundary; nothing is cached and the
/// request fails as a whole.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The render function failed during the static pass or resume walk.
    #[error("classification failed: {0}")]
    Classification(String),

    /// An illegal lifecycle transition was attempted.
    #[error("illegal phase transition: {from} -> {to}")]
    Phase { from: RenderPhase, to: RenderPhase },

    /// The chunk stream was driven out of protocol.
    #[error(transparent)]
    Assembler(#[from] AssemblerError),

    /// A cached artifact could not be encoded or decoded.
    #[error("artifact error: {0}")]
    Artifact(String),

    /// A task join or other internal failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<RegenError> for EngineError {
    fn from(err: RegenError) -> Self {
        match err {
            RegenError::Render(msg) => Self::Classification(msg),
            RegenError::Artifact(msg) => Self::Artifact(msg),
        }
    }
}
