//! # XScenario: scenario graphs for replaying HTTP flows
//!
//! `xscenario` models an HTTP test or automation flow as a graph of steps
//! and executes it against a set of backend servers:
//!
//! - **Steps**: `request` (one HTTP call, optionally saving its response),
//!   `condition` (branching), `loop` (count / forEach / while) and `group`.
//! - **Topology**: edges plus branch and container references, kept in
//!   agreement by every structural edit, with nesting limits and conflict
//!   detection for cut and move.
//! - **Execution**: sequential walk from the start step with `${...}`
//!   variable resolution, cooperative pause / resume / stop, manual steps and
//!   observer callbacks.
//! - **Documents**: YAML, JSON and TOML scenarios with three-layer validation
//!   (structure, topology, semantics) and sanitization on load.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use xscenario::{load_scenario, ScenarioRunner, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let scenario = load_scenario("login.yaml").unwrap();
//!     let handle = ScenarioRunner::builder(scenario)
//!         .server(ServerConfig::new("api", "http://localhost:8080"))
//!         .run()
//!         .await
//!         .unwrap();
//!     let result = handle.wait().await.unwrap();
//!     println!("{:?}", result.status);
//! }
//! ```

pub mod api;
pub mod core;
pub mod domain;
pub mod dsl;
pub mod error;
pub mod evaluator;
pub mod graph;
pub mod template;

pub use crate::api::{ScenarioHandle, ScenarioRunner, ScenarioRunnerBuilder};
pub use crate::core::{
    ControlState, EngineConfig, ExecutionControl, ExecutionObserver, ExecutionOptions,
    HttpRequestSender, LogEntry, LogLevel, RequestSender, ScenarioEngine,
};
pub use crate::domain::execution::{OverallResult, OverallStatus, StepExecutionResult, StepStatus};
pub use crate::domain::model::{
    Branch, BranchCondition, Edge, ExecutionMode, Scenario, ServerConfig, ServerMap, Step,
    StepKind,
};
pub use crate::dsl::{load_scenario, parse_scenario, parse_servers, DslFormat, ValidationReport};
pub use crate::error::{ScenarioError, ScenarioResult, StepError};
