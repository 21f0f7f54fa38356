//! JS bindings for `newton_core`.
//!
//! - [`WasmRootFinder`]: compile once, then solve, batch-solve, report or audit.
//! - [`WasmNewtonRunner`]: step a single search in batches for progress display.

mod finder;
mod runner;

pub use finder::WasmRootFinder;
pub use runner::WasmNewtonRunner;
