//! Shell-first streaming for the Strata rendering cache.
//!
//! The shell goes out as the first chunk; holes resolve concurrently
//! and stream in completion order. `StreamAssembler` tracks exactly-once
//! resolution per hole and can fold the chunks back into one final
//! document for non-streaming consumers.

mod assembler;
mod chunk;

pub use assembler::*;
pub use chunk::*;
