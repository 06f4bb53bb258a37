//! Public API layer: stable entry points for embedding the engine.

mod handle;
mod runner;

pub use handle::ScenarioHandle;
pub use runner::{ScenarioRunner, ScenarioRunnerBuilder};
