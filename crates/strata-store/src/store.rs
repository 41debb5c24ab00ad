//! Cache store backend interface.

use std::collections::BTreeSet;

use async_trait::async_trait;

use crate::entry::CacheEntry;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Store backend errors.
///
/// Callers treat every store error as a degradation, never a request
/// failure: a failed lookup is a miss, a failed write is a no-op.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backend is unreachable or refused the operation.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The backend returned malformed data.
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Pluggable key/value + tag index backend.
///
/// The store holds no caching logic. The revalidation controller is the
/// only component that writes through this interface.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Look up an entry by key.
    async fn get(&self, key: &str) -> StoreResult<Option<CacheEntry>>;

    /// Store an entry. The backend stamps `created_at`.
    async fn set(
        &self,
        key: &str,
        payload: Vec<u8>,
        tags: BTreeSet<String>,
        revalidate_after: Option<u32>,
        expire_at: Option<u32>,
    ) -> StoreResult<()>;

    /// Evict every entry carrying the given tag. Returns the number of
    /// entries evicted. Cost is proportional to the number of tagged
    /// entries, not the store size.
    async fn invalidate_by_tag(&self, tag: &str) -> StoreResult<u64>;

    /// Evict every entry whose key starts with the given prefix.
    /// Returns the number evicted.
    async fn invalidate_by_key_prefix(&self, prefix: &str) -> StoreResult<u64>;

    /// Evict every entry belonging to a route path: the exact key, plus
    /// keys extending the path with params (`?`), scope lineage (`#`),
    /// or a subpath segment (`/`). A sibling route sharing a character
    /// prefix is never touched. Returns the number evicted.
    async fn invalidate_by_path(&self, path: &str) -> StoreResult<u64>;
}
