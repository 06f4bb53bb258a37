use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::BranchCondition;

/// Whether a step runs on its own or waits for an external resume.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    #[default]
    Auto,
    Manual,
}

/// Diagram coordinates. Carried only for the rendering layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[serde(alias = "get")]
    Get,
    #[serde(alias = "post")]
    Post,
    #[serde(alias = "put")]
    Put,
    #[serde(alias = "patch")]
    Patch,
    #[serde(alias = "delete")]
    Delete,
    #[serde(alias = "head")]
    Head,
    #[serde(alias = "options")]
    Options,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Head => "HEAD",
            HttpMethod::Options => "OPTIONS",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Header {
    pub key: String,
    pub value: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Header {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            enabled: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Named conditional exit of a `condition` or `request` step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Branch {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<BranchCondition>,
    /// Empty when the branch is not wired to any step.
    #[serde(default)]
    pub next_step_id: String,
}

impl Branch {
    pub fn new(id: impl Into<String>, condition: BranchCondition) -> Self {
        Self {
            id: id.into(),
            label: None,
            is_default: false,
            condition: Some(condition),
            next_step_id: String::new(),
        }
    }

    pub fn default_branch(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: None,
            is_default: true,
            condition: None,
            next_step_id: String::new(),
        }
    }

    pub fn has_target(&self) -> bool {
        !self.next_step_id.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestStep {
    pub server_id: String,
    pub method: HttpMethod,
    pub endpoint: String,
    #[serde(default)]
    pub headers: Vec<Header>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    #[serde(default = "default_true")]
    pub wait_for_response: bool,
    #[serde(default)]
    pub save_response: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_alias: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub branches: Vec<Branch>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl RequestStep {
    pub fn new(
        server_id: impl Into<String>,
        method: HttpMethod,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            server_id: server_id.into(),
            method,
            endpoint: endpoint.into(),
            headers: Vec::new(),
            body: None,
            wait_for_response: true,
            save_response: false,
            response_alias: None,
            branches: Vec::new(),
            timeout_ms: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionStep {
    pub branches: Vec<Branch>,
}

/// Iteration count of a `count` loop: a literal or a variable reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LoopCount {
    Fixed(u64),
    Reference(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum LoopConfig {
    Count { count: LoopCount },
    ForEach { source: String },
    While { condition: BranchCondition },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoopStep {
    #[serde(rename = "loop")]
    pub config: LoopConfig,
    #[serde(default)]
    pub step_ids: Vec<String>,
    #[serde(default)]
    pub variable_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupStep {
    #[serde(default)]
    pub step_ids: Vec<String>,
    #[serde(default)]
    pub collapsed: bool,
}

/// Variant payload keyed by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum StepKind {
    Request(RequestStep),
    Condition(ConditionStep),
    Loop(LoopStep),
    Group(GroupStep),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub execution_mode: ExecutionMode,
    #[serde(default)]
    pub position: Position,
    #[serde(flatten)]
    pub kind: StepKind,
}

impl Step {
    pub fn new(id: impl Into<String>, kind: StepKind) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            description: String::new(),
            execution_mode: ExecutionMode::Auto,
            position: Position::default(),
            kind,
        }
    }

    pub fn request(id: impl Into<String>, request: RequestStep) -> Self {
        Self::new(id, StepKind::Request(request))
    }

    pub fn condition(id: impl Into<String>, branches: Vec<Branch>) -> Self {
        Self::new(id, StepKind::Condition(ConditionStep { branches }))
    }

    pub fn loop_step(
        id: impl Into<String>,
        config: LoopConfig,
        step_ids: Vec<String>,
        variable_name: impl Into<String>,
    ) -> Self {
        Self::new(
            id,
            StepKind::Loop(LoopStep {
                config,
                step_ids,
                variable_name: variable_name.into(),
            }),
        )
    }

    pub fn group(id: impl Into<String>, step_ids: Vec<String>) -> Self {
        Self::new(
            id,
            StepKind::Group(GroupStep {
                step_ids,
                collapsed: false,
            }),
        )
    }

    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.execution_mode = mode;
        self
    }

    pub fn type_name(&self) -> &'static str {
        match &self.kind {
            StepKind::Request(_) => "request",
            StepKind::Condition(_) => "condition",
            StepKind::Loop(_) => "loop",
            StepKind::Group(_) => "group",
        }
    }

    pub fn branches(&self) -> &[Branch] {
        match &self.kind {
            StepKind::Request(r) => &r.branches,
            StepKind::Condition(c) => &c.branches,
            _ => &[],
        }
    }

    pub fn branches_mut(&mut self) -> Option<&mut Vec<Branch>> {
        match &mut self.kind {
            StepKind::Request(r) => Some(&mut r.branches),
            StepKind::Condition(c) => Some(&mut c.branches),
            _ => None,
        }
    }

    pub fn branch(&self, branch_id: &str) -> Option<&Branch> {
        self.branches().iter().find(|b| b.id == branch_id)
    }

    pub fn branch_mut(&mut self, branch_id: &str) -> Option<&mut Branch> {
        self.branches_mut()?.iter_mut().find(|b| b.id == branch_id)
    }

    /// Direct children of a `loop` or `group`.
    pub fn child_ids(&self) -> Option<&[String]> {
        match &self.kind {
            StepKind::Loop(l) => Some(&l.step_ids),
            StepKind::Group(g) => Some(&g.step_ids),
            _ => None,
        }
    }

    pub fn child_ids_mut(&mut self) -> Option<&mut Vec<String>> {
        match &mut self.kind {
            StepKind::Loop(l) => Some(&mut l.step_ids),
            StepKind::Group(g) => Some(&mut g.step_ids),
            _ => None,
        }
    }

    pub fn is_container(&self) -> bool {
        matches!(self.kind, StepKind::Loop(_) | StepKind::Group(_))
    }
}
