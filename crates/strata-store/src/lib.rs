//! Pluggable cache store for the Strata rendering cache.
//!
//! This crate provides:
//! - `CacheEntry` - One cached artifact with tags and freshness windows
//! - `CacheStore` - Key/value + tag index backend interface
//! - `MemoryStore` - In-memory reference implementation for testing
//!
//! The store holds no policy: freshness is derived from entry timestamps
//! by callers, and eviction beyond explicit invalidation is the
//! backend's own concern.

mod entry;
mod memory;
mod store;

pub use entry::*;
pub use memory::*;
pub use store::*;
