//! Dynamic hole placeholders.

use serde::{Deserialize, Serialize};

/// A placeholder slot in a static shell standing in for a dynamic
/// subtree. The slot carries only the stable id and the fallback shown
/// until the hole resolves; content is never part of the shell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HoleSlot {
    /// Stable id within one render.
    pub id: String,
    /// Content shown until the hole resolves.
    pub fallback: String,
}

impl HoleSlot {
    /// Create a slot.
    pub fn new(id: impl Into<String>, fallback: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fallback: fallback.into(),
        }
    }
}

/// Marker embedded in a shell where a hole's content belongs.
pub fn hole_placeholder(id: &str) -> String {
    format!("<!--hole:{}-->", id)
}

/// Marker substituted for a hole whose resolution failed.
pub fn hole_error_marker(id: &str) -> String {
    format!("<!--hole-error:{}-->", id)
}
