//! Render classification for the Strata rendering cache.
//!
//! This crate observes a render invocation and decides, per work unit,
//! whether it is fully static, fully dynamic, or a static shell with
//! dynamic holes:
//! - `DynamicSignal` - The closed set of per-request/nondeterministic reads
//! - `ScopeManager` - Nested cache scope tracking with contamination
//! - `Render` / `RenderContext` - The render function contract
//! - `ShellArtifact` - The cacheable shell-plus-holes payload
//! - `run_static_pass` / `run_resume_walk` - The two render walks

mod artifact;
mod context;
mod error;
mod pass;
mod scope;
mod signal;

pub use artifact::*;
pub use context::*;
pub use error::*;
pub use pass::*;
pub use scope::*;
pub use signal::*;
