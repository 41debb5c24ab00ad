//! In-memory reference store.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use strata_core::{Clock, SystemClock};

use crate::entry::CacheEntry;
use crate::store::{CacheStore, StoreError, StoreResult};

#[derive(Default)]
struct Inner {
    entries: HashMap<String, CacheEntry>,
    /// Tag -> keys carrying that tag, so tag invalidation only touches
    /// tagged entries.
    tag_index: HashMap<String, HashSet<String>>,
}

impl Inner {
    fn remove_entry(&mut self, key: &str) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        for tag in &entry.tags {
            if let Some(keys) = self.tag_index.get_mut(tag) {
                keys.remove(key);
                if keys.is_empty() {
                    self.tag_index.remove(tag);
                }
            }
        }
        Some(entry)
    }
}

/// In-memory store with a tag index.
///
/// The reference implementation shipped for testing and development; a
/// production backend implements [`CacheStore`] against real storage.
pub struct MemoryStore {
    inner: RwLock<Inner>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    /// Create a store using the wall clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create a store with an injected clock.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            clock,
        }
    }

    /// Number of live entries.
    pub async fn len(&self) -> usize {
        self.inner.read().await.entries.len()
    }

    /// Whether the store is empty.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<CacheEntry>> {
        Ok(self.inner.read().await.entries.get(key).cloned())
    }

    async fn set(
        &self,
        key: &str,
        payload: Vec<u8>,
        tags: BTreeSet<String>,
        revalidate_after: Option<u32>,
        expire_at: Option<u32>,
    ) -> StoreResult<()> {
        let entry = CacheEntry::new(key, payload, self.clock.now_secs())
            .with_tags(tags)
            .with_revalidate_after(revalidate_after)
            .with_expire_at(expire_at);

        let mut inner = self.inner.write().await;
        // Drop the old entry first so stale tag index references go away.
        inner.remove_entry(key);
        for tag in &entry.tags {
            inner
                .tag_index
                .entry(tag.clone())
                .or_default()
                .insert(key.to_string());
        }
        inner.entries.insert(key.to_string(), entry);
        Ok(())
    }

    async fn invalidate_by_tag(&self, tag: &str) -> StoreResult<u64> {
        let mut inner = self.inner.write().await;
        let keys: Vec<String> = inner
            .tag_index
            .get(tag)
            .map(|keys| keys.iter().cloned().collect())
            .unwrap_or_default();
        let mut evicted = 0;
        for key in keys {
            if inner.remove_entry(&key).is_some() {
                evicted += 1;
            }
        }
        Ok(evicted)
    }

    async fn invalidate_by_key_prefix(&self, prefix: &str) -> StoreResult<u64> {
        let mut inner = self.inner.write().await;
        let keys: Vec<String> = inner
            .entries
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        let mut evicted = 0;
        for key in keys {
            if inner.remove_entry(&key).is_some() {
                evicted += 1;
            }
        }
        Ok(evicted)
    }

    async fn invalidate_by_path(&self, path: &str) -> StoreResult<u64> {
        let mut inner = self.inner.write().await;
        let keys: Vec<String> = inner
            .entries
            .keys()
            .filter(|k| {
                k.as_str() == path
                    || k.strip_prefix(path)
                        .is_some_and(|rest| rest.starts_with(['?', '#', '/']))
            })
            .cloned()
            .collect();
        let mut evicted = 0;
        for key in keys {
            if inner.remove_entry(&key).is_some() {
                evicted += 1;
            }
        }
        Ok(evicted)
    }
}

/// A store whose every operation fails. Exercises degraded-mode paths.
#[derive(Debug, Default)]
pub struct FailingStore;

#[async_trait]
impl CacheStore for FailingStore {
    async fn get(&self, _key: &str) -> StoreResult<Option<CacheEntry>> {
        Err(StoreError::Unavailable("backend down".to_string()))
    }

    async fn set(
        &self,
        _key: &str,
        _payload: Vec<u8>,
        _tags: BTreeSet<String>,
        _revalidate_after: Option<u32>,
        _expire_at: Option<u32>,
    ) -> StoreResult<()> {
        Err(StoreError::Unavailable("backend down".to_string()))
    }

    async fn invalidate_by_tag(&self, _tag: &str) -> StoreResult<u64> {
        Err(StoreError::Unavailable("backend down".to_string()))
    }

    async fn invalidate_by_key_prefix(&self, _prefix: &str) -> StoreResult<u64> {
        Err(StoreError::Unavailable("backend down".to_string()))
    }

    async fn invalidate_by_path(&self, _path: &str) -> StoreResult<u64> {
        Err(StoreError::Unavailable("backend down".to_string()))
    }
}
