//! Static/dynamic partitioning result.

use serde::{Deserialize, Serialize};

/// Classification of one unit of rendering work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    /// No dynamic signal observed anywhere; cacheable as-is.
    Static,
    /// A dynamic signal was observed outside every boundary; the whole
    /// unit is recomputed per request and never cached.
    Dynamic,
    /// Dynamic signals observed only inside explicit boundaries; a
    /// static shell plus per-request holes.
    PartiallyStatic,
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Static => write!(f, "static"),
            Self::Dynamic => write!(f, "dynamic"),
            Self::PartiallyStatic => write!(f, "partially-static"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_display() {
        assert_eq!(Classification::Static.to_string(), "static");
        assert_eq!(Classification::PartiallyStatic.to_string(), "partially-static");
    }
}
