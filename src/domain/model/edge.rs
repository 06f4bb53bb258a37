use serde::{Deserialize, Serialize};

/// Diagram edge between two steps.
///
/// When `source_handle` is set it names a branch id on the source step; the
/// branch's `next_step_id` must then equal `target_step_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub id: String,
    pub source_step_id: String,
    pub target_step_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub animated: Option<bool>,
}

impl Edge {
    /// Plain (handle-less) edge.
    pub fn new(
        id: impl Into<String>,
        source_step_id: impl Into<String>,
        target_step_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            source_step_id: source_step_id.into(),
            target_step_id: target_step_id.into(),
            source_handle: None,
            label: None,
            animated: None,
        }
    }

    /// Edge leaving through a branch handle.
    pub fn with_handle(mut self, handle: impl Into<String>) -> Self {
        self.source_handle = Some(handle.into());
        self
    }

    pub fn touches(&self, step_id: &str) -> bool {
        self.source_step_id == step_id || self.target_step_id == step_id
    }
}
