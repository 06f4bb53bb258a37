//! Step and run statuses.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of a single step: `pending → running → terminal` (or `waiting`
/// while a manual step awaits resume).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Waiting,
    Success,
    Failed,
    Skipped,
    Cancelled,
}

impl StepStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StepStatus::Success | StepStatus::Failed | StepStatus::Skipped | StepStatus::Cancelled
        )
    }
}

/// Status of a whole run as reported through `on_status_change`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    Running,
    Paused,
    Success,
    Failed,
    Cancelled,
}

impl OverallStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OverallStatus::Success | OverallStatus::Failed | OverallStatus::Cancelled
        )
    }
}

impl fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OverallStatus::Running => "running",
            OverallStatus::Paused => "paused",
            OverallStatus::Success => "success",
            OverallStatus::Failed => "failed",
            OverallStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}
