//! Error types for the scenario engine.
//!
//! - [`StepError`]: Errors raised while executing a single step. They are
//!   captured on the step's result rather than aborting the run.
//! - [`ScenarioError`]: Document, structural, and run-level errors.
//! - [`ErrorContext`]: Serializable error metadata stored on step results.

pub mod error_context;
pub mod scenario_error;
pub mod step_error;

pub use error_context::{ErrorCode, ErrorContext};
pub use scenario_error::ScenarioError;
pub use step_error::StepError;

/// Convenience alias for scenario-level results.
pub type ScenarioResult<T> = Result<T, ScenarioError>;
/// Convenience alias for step-level results.
pub type StepResult<T> = Result<T, StepError>;
