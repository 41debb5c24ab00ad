//! Prerender orchestration for the Strata rendering cache.
//!
//! The orchestrator ties the layers together per request: look up the
//! cached artifact, classify on a miss through the single-flight
//! controller, stream the shell first, and fill holes concurrently.
//! - `RouteWorkUnit` - A route plus its render function and policy
//! - `PrerenderOrchestrator` - The request pipeline
//! - `RenderPhase` / `PhaseTracker` - Explicit lifecycle transitions

mod error;
mod orchestrator;
mod phase;
mod workunit;

pub use error::*;
pub use orchestrator::*;
pub use phase::*;
pub use workunit::*;
