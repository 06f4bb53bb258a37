use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Edge, Step, StepKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterType {
    String,
    Number,
    Boolean,
    Object,
    Array,
}

/// Declared run parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: ParameterType,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
    #[serde(default)]
    pub description: String,
}

/// A scenario document: the step graph plus its metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_version")]
    pub version: String,
    pub steps: Vec<Step>,
    pub edges: Vec<Edge>,
    #[serde(default)]
    pub parameter_schema: Vec<ParameterDefinition>,
    #[serde(default)]
    pub server_ids: Vec<String>,
    #[serde(default)]
    pub start_step_id: String,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

fn default_version() -> String {
    "1.0.0".to_string()
}

impl Scenario {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            version: default_version(),
            steps: Vec::new(),
            edges: Vec::new(),
            parameter_schema: Vec::new(),
            server_ids: Vec::new(),
            start_step_id: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn step(&self, step_id: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.id == step_id)
    }

    pub fn step_mut(&mut self, step_id: &str) -> Option<&mut Step> {
        self.steps.iter_mut().find(|s| s.id == step_id)
    }

    pub fn contains_step(&self, step_id: &str) -> bool {
        self.step(step_id).is_some()
    }

    pub fn edge(&self, edge_id: &str) -> Option<&Edge> {
        self.edges.iter().find(|e| e.id == edge_id)
    }

    /// The container listing `step_id` as a direct child, if any.
    pub fn parent_of(&self, step_id: &str) -> Option<&Step> {
        self.steps.iter().find(|s| {
            s.child_ids()
                .is_some_and(|children| children.iter().any(|c| c == step_id))
        })
    }

    /// Steps that are not a child of any container, in document order.
    pub fn root_step_ids(&self) -> Vec<&str> {
        self.steps
            .iter()
            .filter(|s| self.parent_of(&s.id).is_none())
            .map(|s| s.id.as_str())
            .collect()
    }

    /// Target of the first handle-less edge leaving `step_id`.
    pub fn default_successor(&self, step_id: &str) -> Option<&str> {
        self.edges
            .iter()
            .find(|e| e.source_step_id == step_id && e.source_handle.is_none())
            .map(|e| e.target_step_id.as_str())
    }

    /// Every server id referenced by a `request` step, sorted.
    pub fn referenced_server_ids(&self) -> BTreeSet<&str> {
        self.steps
            .iter()
            .filter_map(|s| match &s.kind {
                StepKind::Request(r) => Some(r.server_id.as_str()),
                _ => None,
            })
            .collect()
    }

    /// All steps nested (transitively) under `container_id`.
    pub fn descendants_of(&self, container_id: &str) -> Vec<String> {
        let mut out = Vec::new();
        let mut stack = vec![container_id.to_string()];
        while let Some(id) = stack.pop() {
            let Some(children) = self.step(&id).and_then(|s| s.child_ids()) else {
                continue;
            };
            for child in children {
                if child == container_id || out.contains(child) {
                    continue;
                }
                out.push(child.clone());
                stack.push(child.clone());
            }
        }
        out
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{HttpMethod, RequestStep};

    fn request(id: &str, server: &str) -> Step {
        Step::request(id, RequestStep::new(server, HttpMethod::Get, "/"))
    }

    #[test]
    fn test_parent_and_root_lookup() {
        let mut scenario = Scenario::new("s", "S");
        scenario.steps.push(Step::group("g", vec!["a".into()]));
        scenario.steps.push(request("a", "api"));
        scenario.steps.push(request("b", "api"));

        assert_eq!(scenario.parent_of("a").unwrap().id, "g");
        assert!(scenario.parent_of("b").is_none());
        assert_eq!(scenario.root_step_ids(), vec!["g", "b"]);
    }

    #[test]
    fn test_default_successor_ignores_handles() {
        let mut scenario = Scenario::new("s", "S");
        scenario.edges.push(Edge::new("e1", "a", "b").with_handle("br"));
        scenario.edges.push(Edge::new("e2", "a", "c"));
        assert_eq!(scenario.default_successor("a"), Some("c"));
        assert_eq!(scenario.default_successor("c"), None);
    }

    #[test]
    fn test_descendants_nested() {
        let mut scenario = Scenario::new("s", "S");
        scenario.steps.push(Step::group("outer", vec!["inner".into()]));
        scenario.steps.push(Step::group("inner", vec!["leaf".into()]));
        scenario.steps.push(request("leaf", "api"));
        let mut descendants = scenario.descendants_of("outer");
        descendants.sort();
        assert_eq!(descendants, vec!["inner".to_string(), "leaf".to_string()]);
    }

    #[test]
    fn test_referenced_servers_deduplicated() {
        let mut scenario = Scenario::new("s", "S");
        scenario.steps.push(request("a", "api"));
        scenario.steps.push(request("b", "auth"));
        scenario.steps.push(request("c", "api"));
        let servers: Vec<_> = scenario.referenced_server_ids().into_iter().collect();
        assert_eq!(servers, vec!["api", "auth"]);
    }
}
