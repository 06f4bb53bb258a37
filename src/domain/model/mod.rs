//! Authored scenario graph types.

mod condition;
mod edge;
mod scenario;
mod server;
mod step;

pub use condition::{BranchCondition, Comparison, ComparisonOperator};
pub use edge::Edge;
pub use scenario::{ParameterDefinition, ParameterType, Scenario};
pub use server::{ServerConfig, ServerMap};
pub use step::{
    Branch, ConditionStep, ExecutionMode, GroupStep, Header, HttpMethod, LoopConfig, LoopCount,
    LoopStep, Position, RequestStep, Step, StepKind,
};
