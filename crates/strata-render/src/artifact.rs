//! Cacheable shell artifacts.

use serde::{Deserialize, Serialize};

use strata_core::{Classification, HoleSlot};

/// Artifact encode/decode errors.
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("artifact encode failed: {0}")]
    Encode(String),

    #[error("artifact decode failed: {0}")]
    Decode(String),
}

/// The persisted form of a cacheable render: the static shell with
/// hole placeholders embedded, plus the slots describing each hole.
/// Hole content is never part of the artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShellArtifact {
    /// Shell HTML with `<!--hole:{id}-->` markers.
    pub shell: String,
    /// Pending holes, in shell order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub holes: Vec<HoleSlot>,
}

impl ShellArtifact {
    /// Create a partial artifact with pending holes.
    pub fn new(shell: impl Into<String>, holes: Vec<HoleSlot>) -> Self {
        Self {
            shell: shell.into(),
            holes,
        }
    }

    /// Create a complete, hole-free artifact.
    pub fn complete(html: impl Into<String>) -> Self {
        Self {
            shell: html.into(),
            holes: Vec::new(),
        }
    }

    /// Whether the artifact needs no per-request fill.
    pub fn is_complete(&self) -> bool {
        self.holes.is_empty()
    }

    /// Classification this artifact represents. Dynamic units are
    /// never persisted, so only two classifications occur here.
    pub fn classification(&self) -> Classification {
        if self.holes.is_empty() {
            Classification::Static
        } else {
            Classification::PartiallyStatic
        }
    }

    /// Encode for storage.
    pub fn to_payload(&self) -> Result<Vec<u8>, ArtifactError> {
        serde_json::to_vec(self).map_err(|e| ArtifactError::Encode(e.to_string()))
    }

    /// Decode from a stored payload.
    pub fn from_payload(payload: &[u8]) -> Result<Self, ArtifactError> {
        serde_json::from_slice(payload).map_err(|e| ArtifactError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_roundtrip() {
        let artifact = ShellArtifact::new(
            "<body><!--hole:1:footer--></body>",
            vec![HoleSlot::new("1:footer", "loading...")],
        );
        let payload = artifact.to_payload().unwrap();
        let decoded = ShellArtifact::from_payload(&payload).unwrap();
        assert_eq!(decoded, artifact);
        assert_eq!(decoded.classification(), Classification::PartiallyStatic);
    }

    #[test]
    fn test_complete_artifact() {
        let artifact = ShellArtifact::complete("<body>hi</body>");
        assert!(artifact.is_complete());
        assert_eq!(artifact.classification(), Classification::Static);
    }

    #[test]
    fn test_decode_garbage_fails() {
        assert!(ShellArtifact::from_payload(b"not json").is_err());
    }
}
