//! Stream chunk protocol.

/// One unit of a streamed response. The shell is always first; hole
/// chunks follow in completion order, not declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Chunk {
    /// The static shell with placeholders embedded, plus fallbacks.
    Shell(String),
    /// A hole resolved with fresh content.
    HoleResolved { id: String, html: String },
    /// A hole's resolver failed; the client keeps the fallback.
    HoleFailed { id: String, message: String },
    /// No further chunks follow.
    Done,
}
