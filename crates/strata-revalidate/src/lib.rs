//! Revalidation control for the Strata rendering cache.
//!
//! This crate provides:
//! - `RevalidationController` - The sole writer to the cache store:
//!   single-flight regeneration, stale-while-revalidate dispatch,
//!   degraded operation when the store backend fails
//! - `RevalidationRequest` - Targeted on-demand invalidation

mod controller;
mod request;

pub use controller::*;
pub use request::*;
