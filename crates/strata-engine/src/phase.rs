//! Render lifecycle phases.

use tracing::debug;

use crate::error::EngineError;

/// Phases a request moves through inside the orchestrator. Transitions
/// are explicit; an out-of-order move is an internal error rather than
/// silently serving a half-built response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderPhase {
    /// Nothing decided yet.
    Idle,
    /// Running the speculative static pass (or deciding it is not
    /// needed because a cached artifact exists).
    ClassifyingStatic,
    /// Serving a previously cached artifact.
    Cached,
    /// A freshly computed shell is ready to stream.
    ShellReady,
    /// The unit classified dynamic; serving a per-request render.
    FullyDynamic,
    /// Shell sent, holes streaming.
    Streaming,
    /// All chunks emitted.
    Done,
    /// The request failed; terminal.
    Failed,
}

impl RenderPhase {
    fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    fn can_advance_to(self, next: Self) -> bool {
        use RenderPhase::*;
        matches!(
            (self, next),
            (Idle, ClassifyingStatic)
                | (ClassifyingStatic, Cached)
                | (ClassifyingStatic, ShellReady)
                | (ClassifyingStatic, FullyDynamic)
                | (Cached, Streaming)
                | (ShellReady, Streaming)
                | (FullyDynamic, Streaming)
                | (Streaming, Done)
        )
    }
}

impl std::fmt::Display for RenderPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::ClassifyingStatic => "classifying-static",
            Self::Cached => "cached",
            Self::ShellReady => "shell-ready",
            Self::FullyDynamic => "fully-dynamic",
            Self::Streaming => "streaming",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

/// Tracks one request's phase and enforces legal transitions.
#[derive(Debug)]
pub struct PhaseTracker {
    current: RenderPhase,
}

impl PhaseTracker {
    pub fn new() -> Self {
        Self {
            current: RenderPhase::Idle,
        }
    }

    pub fn current(&self) -> RenderPhase {
        self.current
    }

    /// Move to the next phase, rejecting illegal transitions.
    pub fn advance(&mut self, next: RenderPhase) -> Result<(), EngineError> {
        if !self.current.can_advance_to(next) {
            return Err(EngineError::Phase {
                from: self.current,
                to: next,
            });
        }
        debug!(from = %self.current, to = %next, "render phase transition");
        self.current = next;
        Ok(())
    }

    /// Mark the request failed. Allowed from any non-terminal phase.
    pub fn fail(&mut self) {
        if !self.current.is_terminal() {
            debug!(from = %self.current, "render phase failed");
            self.current = RenderPhase::Failed;
        }
    }
}

impl Default for PhaseTracker {
    fn default() -> Self {
        Self::new()
    }
}
