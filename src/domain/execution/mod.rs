//! Per-run execution state.

mod context;
mod result;
mod status;

pub use context::{ExecutionContext, LoopScope};
pub use result::{OverallResult, RequestRecord, ResponseRecord, StepExecutionResult};
pub use status::{OverallStatus, StepStatus};
