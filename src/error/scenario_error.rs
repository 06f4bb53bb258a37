//! Scenario-level error types.

use thiserror::Error;

use crate::dsl::validation::ValidationReport;

/// Scenario-level errors
#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("Scenario parse error: {0}")]
    ParseError(String),
    #[error("Scenario serialize error: {0}")]
    SerializeError(String),
    #[error("Validation failed")]
    ValidationFailed(Box<ValidationReport>),
    #[error("Missing servers: {}", missing.join(", "))]
    MissingServers { missing: Vec<String> },
    #[error("Missing required parameters: {}", missing.join(", "))]
    MissingParameters { missing: Vec<String> },
    #[error("Invalid edge: {0}")]
    InvalidEdge(String),
    #[error("Edge not found: {0}")]
    EdgeNotFound(String),
    #[error("Step not found: {0}")]
    StepNotFound(String),
    #[error("Duplicate step id: {0}")]
    DuplicateStep(String),
    #[error("Not a container step: {0}")]
    NotAContainer(String),
    #[error("Nesting limit exceeded: container={container_id}, max depth={max_depth}")]
    NestingLimitExceeded {
        container_id: String,
        max_depth: usize,
    },
    #[error("Invalid container membership: {0}")]
    InvalidMembership(String),
    #[error("Containment cycle: {0}")]
    ContainmentCycle(String),
    #[error("Unconfirmed edge conflicts: {}", edge_ids.join(", "))]
    UnconfirmedConflicts { edge_ids: Vec<String> },
    #[error("Invalid control transition: cannot {action} while {from}")]
    InvalidControlTransition { from: String, action: String },
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Internal error: {0}")]
    InternalError(String),
}
