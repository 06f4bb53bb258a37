use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{OverallStatus, StepStatus};
use crate::domain::model::HttpMethod;
use crate::error::ErrorContext;

/// The request as it was actually sent, after variable resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestRecord {
    pub method: HttpMethod,
    pub url: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseRecord {
    pub status: u16,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Parsed JSON when the body is JSON, otherwise the raw text.
    pub body: Value,
    #[serde(default)]
    pub duration_ms: u64,
}

impl ResponseRecord {
    pub fn is_success(&self) -> bool {
        self.status < 400
    }

    /// Shape exposed to variable references (`${alias.body.field}`).
    pub fn to_value(&self) -> Value {
        json!({
            "status": self.status,
            "headers": self.headers,
            "body": self.body,
            "durationMs": self.duration_ms,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepExecutionResult {
    pub step_id: String,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<RequestRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<ResponseRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorContext>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_iteration: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iterations: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_branch: Option<String>,
}

impl StepExecutionResult {
    pub fn new(step_id: impl Into<String>, status: StepStatus) -> Self {
        Self {
            step_id: step_id.into(),
            status,
            started_at: None,
            completed_at: None,
            request: None,
            response: None,
            error: None,
            current_iteration: None,
            iterations: None,
            selected_branch: None,
        }
    }

    pub fn skipped(step_id: impl Into<String>, at: DateTime<Utc>) -> Self {
        let mut result = Self::new(step_id, StepStatus::Skipped);
        result.completed_at = Some(at);
        result
    }
}

/// Final report of one run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverallResult {
    pub execution_id: String,
    pub scenario_id: String,
    pub status: OverallStatus,
    /// Every completed step result in visit order (loop children once per
    /// iteration).
    pub results: Vec<StepExecutionResult>,
    pub saved_responses: HashMap<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl OverallResult {
    /// Results for one step in visit order.
    pub fn results_for<'a>(
        &'a self,
        step_id: &'a str,
    ) -> impl Iterator<Item = &'a StepExecutionResult> + 'a {
        self.results.iter().filter(move |r| r.step_id == step_id)
    }

    /// Last recorded result for a step.
    pub fn last_result(&self, step_id: &str) -> Option<&StepExecutionResult> {
        self.results.iter().rev().find(|r| r.step_id == step_id)
    }
}
