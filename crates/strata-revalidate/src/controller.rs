//! Single-flight regeneration and stale-while-revalidate dispatch.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use tracing::{debug, info, warn};

use strata_core::{CacheKey, Clock};
use strata_store::{CacheEntry, CacheStatus, CacheStore, Freshness};

use crate::request::{InvalidationTarget, RevalidationRequest};

/// Regeneration errors. Clone so they can flow through shared futures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RegenError {
    /// The render function failed outside every boundary.
    #[error("regeneration render failed: {0}")]
    Render(String),

    /// A cached artifact could not be encoded or decoded.
    #[error("artifact encoding failed: {0}")]
    Artifact(String),
}

/// A cacheable artifact produced by a regeneration, before it is
/// stamped and written.
#[derive(Debug, Clone)]
pub struct PreparedEntry {
    pub payload: Vec<u8>,
    pub tags: BTreeSet<String>,
    pub revalidate_after: Option<u32>,
    pub expire_at: Option<u32>,
}

/// What a regeneration produced.
#[derive(Debug, Clone)]
pub enum RegenOutcome {
    /// A cacheable artifact, already written to the store.
    Cacheable(CacheEntry),
    /// The route turned out dynamic; nothing was cached and every
    /// request renders for itself.
    Uncacheable,
}

/// The future a caller supplies to compute a fresh artifact.
/// `Ok(None)` means the unit classified dynamic and must not be cached.
pub type RegenFuture = BoxFuture<'static, Result<Option<PreparedEntry>, RegenError>>;

type SharedRegen = Shared<BoxFuture<'static, Result<RegenOutcome, RegenError>>>;
type InflightMap = Arc<Mutex<HashMap<String, SharedRegen>>>;

/// Result of a cache lookup through the controller.
#[derive(Debug)]
pub enum Lookup {
    /// A servable entry, with its lookup-time status.
    Hit {
        entry: CacheEntry,
        status: CacheStatus,
    },
    /// No servable entry (missing, expired, or store degraded).
    Miss,
}

/// Deduplicates concurrent regeneration per cache key, applies
/// staleness, and owns every write to the cache store.
///
/// The single-flight registry is a mutex-guarded map of in-flight
/// shared futures, one per key. Concurrent callers for the same key
/// await the same future instead of rendering twice. Every flight is
/// driven by a detached task that also removes the registry entry, so
/// a dispatched regeneration reaches the store and releases its key
/// even when every foreground caller is dropped mid-await.
pub struct RevalidationController {
    store: Arc<dyn CacheStore>,
    clock: Arc<dyn Clock>,
    inflight: InflightMap,
}

impl RevalidationController {
    /// Create a controller over a store backend.
    pub fn new(store: Arc<dyn CacheStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            inflight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Current time in unix seconds.
    pub fn now_secs(&self) -> u64 {
        self.clock.now_secs()
    }

    /// Whether a regeneration for the key is currently in flight.
    pub fn is_inflight(&self, key: &CacheKey) -> bool {
        self.inflight
            .lock()
            .expect("inflight registry poisoned")
            .contains_key(key.as_str())
    }

    /// Look up a servable entry. Store failures degrade to a miss.
    pub async fn lookup(&self, key: &CacheKey) -> Lookup {
        let entry = match self.store.get(key.as_str()).await {
            Ok(Some(entry)) => entry,
            Ok(None) => return Lookup::Miss,
            Err(err) => {
                warn!(key = %key, error = %err, "cache store lookup failed, treating as miss");
                return Lookup::Miss;
            }
        };

        match entry.freshness(self.clock.now_secs()) {
            Freshness::Fresh => Lookup::Hit {
                entry,
                status: CacheStatus::Hit,
            },
            Freshness::Stale => {
                let status = if self.is_inflight(key) {
                    CacheStatus::Revalidating
                } else {
                    CacheStatus::Stale
                };
                Lookup::Hit { entry, status }
            }
            Freshness::Expired => {
                debug!(key = %key, "entry past hard expiry, treating as miss");
                Lookup::Miss
            }
        }
    }

    /// Regenerate the entry for a key, deduplicating concurrent callers.
    ///
    /// If a regeneration for the key is already in flight the caller
    /// awaits it instead of starting another. The flight itself runs
    /// detached, so cancelling this call never cancels or wedges the
    /// regeneration.
    pub async fn regenerate(
        &self,
        key: &CacheKey,
        regen: RegenFuture,
    ) -> Result<RegenOutcome, RegenError> {
        let (fut, _) = self.join_flight(key, regen);
        fut.await
    }

    /// Dispatch a detached background regeneration for a stale key.
    ///
    /// Returns `false` when one is already in flight, so concurrent
    /// stale hits dispatch exactly one.
    pub fn spawn_background_regenerate(&self, key: &CacheKey, regen: RegenFuture) -> bool {
        let (_, owner) = self.join_flight(key, regen);
        if owner {
            info!(key = %key, "dispatching background regeneration");
        }
        owner
    }

    /// Write an artifact through the controller. Degrades to a no-op on
    /// store failure; the stamped entry is still returned so the
    /// request proceeds.
    pub async fn store_entry(&self, key: &CacheKey, prepared: PreparedEntry) -> CacheEntry {
        let entry = CacheEntry::new(key.as_str(), prepared.payload.clone(), self.clock.now_secs())
            .with_tags(prepared.tags.clone())
            .with_revalidate_after(prepared.revalidate_after)
            .with_expire_at(prepared.expire_at);

        if let Err(err) = self
            .store
            .set(
                key.as_str(),
                prepared.payload,
                prepared.tags,
                prepared.revalidate_after,
                prepared.expire_at,
            )
            .await
        {
            warn!(key = %key, error = %err, "cache store write failed, continuing uncached");
        }
        entry
    }

    /// Apply a targeted invalidation. Evicts matching entries without
    /// triggering regeneration; the next request recomputes lazily.
    /// Returns the number of entries evicted (0 on a degraded store).
    pub async fn invalidate(&self, request: RevalidationRequest) -> u64 {
        let result = match &request.target {
            InvalidationTarget::Tag(tag) => self.store.invalidate_by_tag(tag).await,
            InvalidationTarget::Key(key) => self.store.invalidate_by_key_prefix(key).await,
            InvalidationTarget::Path(path) => self.store.invalidate_by_path(path).await,
        };

        match result {
            Ok(evicted) => {
                info!(target = ?request.target, trigger = ?request.trigger, evicted, "invalidated cache entries");
                evicted
            }
            Err(err) => {
                warn!(target = ?request.target, error = %err, "invalidation failed on degraded store");
                0
            }
        }
    }

    /// Join or start the in-flight regeneration for a key. Returns the
    /// shared future and whether this caller started it. A started
    /// flight is polled to completion by a detached task, which also
    /// clears the registry entry afterward.
    fn join_flight(&self, key: &CacheKey, regen: RegenFuture) -> (SharedRegen, bool) {
        let mut map = self.inflight.lock().expect("inflight registry poisoned");
        if let Some(existing) = map.get(key.as_str()) {
            debug!(key = %key, "joining in-flight regeneration");
            return (existing.clone(), false);
        }

        let store = Arc::clone(&self.store);
        let clock = Arc::clone(&self.clock);
        let key_str = key.as_str().to_string();
        let fut: SharedRegen = async move {
            match regen.await? {
                Some(prepared) => {
                    let entry =
                        CacheEntry::new(&key_str, prepared.payload.clone(), clock.now_secs())
                            .with_tags(prepared.tags.clone())
                            .with_revalidate_after(prepared.revalidate_after)
                            .with_expire_at(prepared.expire_at);
                    if let Err(err) = store
                        .set(
                            &key_str,
                            prepared.payload,
                            prepared.tags,
                            prepared.revalidate_after,
                            prepared.expire_at,
                        )
                        .await
                    {
                        warn!(key = %key_str, error = %err, "cache store write failed, continuing uncached");
                    }
                    Ok(RegenOutcome::Cacheable(entry))
                }
                None => Ok(RegenOutcome::Uncacheable),
            }
        }
        .boxed()
        .shared();

        map.insert(key.as_str().to_string(), fut.clone());

        let inflight = Arc::clone(&self.inflight);
        let registry_key = key.as_str().to_string();
        let driver = fut.clone();
        tokio::spawn(async move {
            if let Err(err) = driver.await {
                warn!(key = %registry_key, error = %err, "regeneration failed");
            }
            inflight
                .lock()
                .expect("inflight registry poisoned")
                .remove(&registry_key);
        });

        (fut, true)
    }
}
