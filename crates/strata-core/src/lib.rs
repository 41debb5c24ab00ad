//! Core types for the Strata incremental rendering cache.
//!
//! This crate provides the fundamental types shared by the engine:
//! - `RequestContext` - Typed per-request inputs
//! - `CachePolicy` - Route-level cache configuration
//! - `CacheKey` / `CacheKeyBuilder` - Structured cache key composition
//! - `Classification` - Static/dynamic partitioning result
//! - `Clock` - Time source abstraction

mod classify;
mod clock;
mod config;
mod context;
mod hole;
mod key;

pub use classify::*;
pub use clock::*;
pub use config::*;
pub use context::*;
pub use hole::*;
pub use key::*;
