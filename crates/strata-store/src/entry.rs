//! Cached artifact entries and freshness.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Time-derived freshness of a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Within the revalidation window; servable as-is.
    Fresh,
    /// Past the revalidation window but before hard expiry; servable
    /// while a background regeneration runs.
    Stale,
    /// Past hard expiry; must not be served.
    Expired,
}

/// Status of a cache lookup, as reported to the serving layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheStatus {
    /// Fresh cache hit.
    Hit,
    /// Stale hit (served while revalidating).
    Stale,
    /// Stale hit with a regeneration already in flight.
    Revalidating,
    /// Cache miss.
    Miss,
    /// Caching disabled for the route.
    Bypass,
}

impl std::fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Hit => write!(f, "HIT"),
            Self::Stale => write!(f, "STALE"),
            Self::Revalidating => write!(f, "REVALIDATING"),
            Self::Miss => write!(f, "MISS"),
            Self::Bypass => write!(f, "BYPASS"),
        }
    }
}

/// One cached artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Cache key this entry was stored under.
    pub key: String,
    /// Opaque payload bytes.
    pub payload: Vec<u8>,
    /// Tags for group invalidation.
    pub tags: BTreeSet<String>,
    /// Creation time, unix seconds.
    pub created_at: u64,
    /// Seconds after creation at which the entry becomes stale.
    /// `None` means the entry never goes stale by time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revalidate_after_secs: Option<u32>,
    /// Seconds after creation at which the entry must not be served.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expire_at_secs: Option<u32>,
}

impl CacheEntry {
    /// Create a new entry stamped at `created_at`.
    pub fn new(key: impl Into<String>, payload: Vec<u8>, created_at: u64) -> Self {
        Self {
            key: key.into(),
            payload,
            tags: BTreeSet::new(),
            created_at,
            revalidate_after_secs: None,
            expire_at_secs: None,
        }
    }

    /// Attach tags.
    pub fn with_tags(mut self, tags: BTreeSet<String>) -> Self {
        self.tags = tags;
        self
    }

    /// Set the revalidation window.
    pub fn with_revalidate_after(mut self, secs: Option<u32>) -> Self {
        self.revalidate_after_secs = secs;
        self
    }

    /// Set the hard expiry window.
    pub fn with_expire_at(mut self, secs: Option<u32>) -> Self {
        self.expire_at_secs = secs;
        self
    }

    /// Derive freshness at the given time.
    pub fn freshness(&self, now: u64) -> Freshness {
        if let Some(expire) = self.expire_at_secs {
            if now >= self.created_at + u64::from(expire) {
                return Freshness::Expired;
            }
        }
        if let Some(revalidate) = self.revalidate_after_secs {
            if now > self.created_at + u64::from(revalidate) {
                return Freshness::Stale;
            }
        }
        Freshness::Fresh
    }

    /// Age of the entry in seconds.
    pub fn age(&self, now: u64) -> u64 {
        now.saturating_sub(self.created_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> CacheEntry {
        CacheEntry::new("/p", b"v1".to_vec(), 100)
            .with_revalidate_after(Some(60))
            .with_expire_at(Some(300))
    }

    #[test]
    fn test_fresh_within_revalidate_window() {
        assert_eq!(entry().freshness(130), Freshness::Fresh);
        // Boundary: stale strictly after created_at + revalidate.
        assert_eq!(entry().freshness(160), Freshness::Fresh);
    }

    #[test]
    fn test_stale_after_revalidate_before_expire() {
        assert_eq!(entry().freshness(170), Freshness::Stale);
        assert_eq!(entry().freshness(399), Freshness::Stale);
    }

    #[test]
    fn test_expired_after_hard_expiry() {
        assert_eq!(entry().freshness(400), Freshness::Expired);
        assert_eq!(entry().freshness(1000), Freshness::Expired);
    }

    #[test]
    fn test_never_stale_without_revalidate() {
        let e = CacheEntry::new("/p", b"v1".to_vec(), 100);
        assert_eq!(e.freshness(u64::MAX), Freshness::Fresh);
    }

    #[test]
    fn test_age() {
        assert_eq!(entry().age(130), 30);
        assert_eq!(entry().age(50), 0);
    }
}
