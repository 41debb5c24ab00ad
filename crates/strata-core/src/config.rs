//! Route-level cache configuration.

use serde::{Deserialize, Serialize};

/// Time-based revalidation setting for a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Revalidate {
    /// Entry becomes stale this many seconds after creation.
    After(u32),
    /// Entry never goes stale by time (only on-demand invalidation).
    Never,
}

impl Revalidate {
    /// Seconds after which an entry is stale, if any.
    pub fn after_secs(&self) -> Option<u32> {
        match self {
            Self::After(secs) => Some(*secs),
            Self::Never => None,
        }
    }
}

/// Cache policy consumed per route.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachePolicy {
    /// Whether caching is enabled for this route.
    pub enabled: bool,
    /// Time-based staleness.
    pub revalidate: Revalidate,
    /// Hard expiry in seconds after creation; an entry past this must
    /// not be served at all.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expire_secs: Option<u32>,
    /// Cache tags attached to every entry this route produces.
    pub tags: Vec<String>,
    /// Persist a fully-resolved render as a complete entry when every
    /// hole resolved without observing a dynamic signal. Tunable
    /// optimization, off by default.
    pub retroactive_complete: bool,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            revalidate: Revalidate::Never,
            expire_secs: None,
            tags: Vec::new(),
            retroactive_complete: false,
        }
    }
}

impl CachePolicy {
    /// Create a policy with caching disabled.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Create a policy that revalidates after the given number of seconds.
    pub fn revalidate_after(secs: u32) -> Self {
        Self {
            enabled: true,
            revalidate: Revalidate::After(secs),
            ..Default::default()
        }
    }

    /// Create a policy that never goes stale by time.
    pub fn never_stale() -> Self {
        Self {
            enabled: true,
            revalidate: Revalidate::Never,
            ..Default::default()
        }
    }

    /// Set the hard expiry window.
    pub fn with_expire(mut self, secs: u32) -> Self {
        self.expire_secs = Some(secs);
        self
    }

    /// Add a cache tag.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Enable retroactive caching of fully-resolved renders.
    pub fn with_retroactive_complete(mut self) -> Self {
        self.retroactive_complete = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_revalidate_after_secs() {
        assert_eq!(Revalidate::After(60).after_secs(), Some(60));
        assert_eq!(Revalidate::Never.after_secs(), None);
    }

    #[test]
    fn test_policy_builder() {
        let policy = CachePolicy::revalidate_after(60)
            .with_expire(3600)
            .with_tag("products");
        assert!(policy.enabled);
        assert_eq!(policy.revalidate, Revalidate::After(60));
        assert_eq!(policy.expire_secs, Some(3600));
        assert_eq!(policy.tags, vec!["products".to_string()]);
        assert!(!policy.retroactive_complete);
    }

    #[test]
    fn test_disabled_policy() {
        let policy = CachePolicy::disabled();
        assert!(!policy.enabled);
    }
}
