//! Mutable per-run state owned by one engine run.

use std::collections::HashMap;

use serde_json::Value;

use super::StepExecutionResult;
use crate::domain::model::{ExecutionMode, Step};
use crate::template::VariableLookup;

/// Variables a loop exposes to its body for the current iteration.
#[derive(Debug, Clone)]
pub struct LoopScope {
    pub loop_id: String,
    pub variables: HashMap<String, Value>,
}

/// Created at execution start, mutated only by the engine, and discarded at
/// terminal status.
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    pub current_step_id: Option<String>,
    /// Latest result per step.
    pub step_results: HashMap<String, StepExecutionResult>,
    pub step_mode_overrides: HashMap<String, ExecutionMode>,
    pub params: HashMap<String, Value>,
    pub saved_responses: HashMap<String, Value>,
    loop_scopes: Vec<LoopScope>,
}

impl ExecutionContext {
    pub fn new(
        params: HashMap<String, Value>,
        step_mode_overrides: HashMap<String, ExecutionMode>,
    ) -> Self {
        Self {
            params,
            step_mode_overrides,
            ..Default::default()
        }
    }

    /// Mode after applying per-run overrides.
    pub fn effective_mode(&self, step: &Step) -> ExecutionMode {
        self.step_mode_overrides
            .get(&step.id)
            .copied()
            .unwrap_or(step.execution_mode)
    }

    pub fn record(&mut self, result: StepExecutionResult) {
        self.step_results.insert(result.step_id.clone(), result);
    }

    pub fn save_response(&mut self, alias: impl Into<String>, value: Value) {
        self.saved_responses.insert(alias.into(), value);
    }

    pub fn push_loop_scope(&mut self, scope: LoopScope) {
        self.loop_scopes.push(scope);
    }

    pub fn pop_loop_scope(&mut self) -> Option<LoopScope> {
        self.loop_scopes.pop()
    }

    /// Innermost scope of `loop_id`, for updating per-iteration variables.
    pub fn loop_scope_mut(&mut self, loop_id: &str) -> Option<&mut LoopScope> {
        self.loop_scopes
            .iter_mut()
            .rev()
            .find(|scope| scope.loop_id == loop_id)
    }
}

impl VariableLookup for ExecutionContext {
    fn param(&self, name: &str) -> Option<&Value> {
        self.loop_scopes
            .iter()
            .rev()
            .find_map(|scope| scope.variables.get(name))
            .or_else(|| self.params.get(name))
    }

    fn saved_response(&self, alias: &str) -> Option<&Value> {
        self.saved_responses.get(alias)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{HttpMethod, RequestStep};
    use serde_json::json;

    #[test]
    fn test_loop_scope_shadows_params() {
        let mut ctx = ExecutionContext::new(
            HashMap::from([("item".to_string(), json!("outer"))]),
            HashMap::new(),
        );
        assert_eq!(ctx.param("item"), Some(&json!("outer")));

        ctx.push_loop_scope(LoopScope {
            loop_id: "l1".into(),
            variables: HashMap::from([("item".to_string(), json!(1))]),
        });
        assert_eq!(ctx.param("item"), Some(&json!(1)));

        ctx.pop_loop_scope();
        assert_eq!(ctx.param("item"), Some(&json!("outer")));
    }

    #[test]
    fn test_effective_mode_override() {
        let step = Step::request("a", RequestStep::new("api", HttpMethod::Get, "/"))
            .with_mode(ExecutionMode::Manual);
        let mut ctx = ExecutionContext::default();
        assert_eq!(ctx.effective_mode(&step), ExecutionMode::Manual);
        ctx.step_mode_overrides
            .insert("a".to_string(), ExecutionMode::Auto);
        assert_eq!(ctx.effective_mode(&step), ExecutionMode::Auto);
    }
}
