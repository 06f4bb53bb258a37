//! Scenario execution engine.
//!
//! Walks the step graph from the start step, one step at a time:
//!
//! - `request` steps resolve their templates, go out through the
//!   [`RequestSender`], and optionally save the response under an alias.
//! - `condition` steps pick a branch and jump to its target.
//! - `loop` and `group` steps run their body in `stepIds` order. A branch
//!   that targets a sibling jumps within the body; any other target leaves
//!   the container.
//!
//! Pause and stop are cooperative and only observed between steps.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::core::config::EngineConfig;
use crate::core::control::{ControlState, ExecutionControl};
use crate::core::event_bus::{ExecutionObserver, LogEntry, LogLevel, NoopObserver};
use crate::core::http_client::{effective_timeout, merge_headers, RequestSender};
use crate::core::runtime_context::RuntimeContext;
use crate::domain::execution::{
    ExecutionContext, LoopScope, OverallResult, OverallStatus, RequestRecord,
    StepExecutionResult, StepStatus,
};
use crate::domain::model::{
    Branch, ExecutionMode, LoopConfig, LoopCount, LoopStep, RequestStep, Scenario, ServerConfig,
    ServerMap, Step, StepKind,
};
use crate::error::{ErrorCode, ErrorContext, ScenarioError, ScenarioResult, StepError};
use crate::evaluator::type_coercion::to_f64;
use crate::evaluator::{evaluate_branches, evaluate_condition, BranchSelection};
use crate::graph::{verify_topology, FlowGraph};
use crate::template::{lookup_reference, resolve_string, resolve_value, WithResponse};

/// Per-run options.
#[derive(Clone)]
pub struct ExecutionOptions {
    pub step_mode_overrides: HashMap<String, ExecutionMode>,
    /// Falls back to [`EngineConfig::stop_on_error`] when unset.
    pub stop_on_error: Option<bool>,
    pub observer: Arc<dyn ExecutionObserver>,
    /// Keep a clone to pause, resume or stop the run from outside.
    pub control: ExecutionControl,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            step_mode_overrides: HashMap::new(),
            stop_on_error: None,
            observer: Arc::new(NoopObserver),
            control: ExecutionControl::new(),
        }
    }
}

impl std::fmt::Debug for ExecutionOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionOptions")
            .field("step_mode_overrides", &self.step_mode_overrides)
            .field("stop_on_error", &self.stop_on_error)
            .field("control", &self.control)
            .finish_non_exhaustive()
    }
}

impl ExecutionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_observer(mut self, observer: Arc<dyn ExecutionObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_control(mut self, control: ExecutionControl) -> Self {
        self.control = control;
        self
    }

    pub fn with_mode_override(mut self, step_id: impl Into<String>, mode: ExecutionMode) -> Self {
        self.step_mode_overrides.insert(step_id.into(), mode);
        self
    }

    pub fn with_stop_on_error(mut self, stop_on_error: bool) -> Self {
        self.stop_on_error = Some(stop_on_error);
        self
    }
}

/// Runs scenarios against a [`RequestSender`]. One engine can serve many
/// runs; all per-run state lives in the run itself.
pub struct ScenarioEngine {
    config: EngineConfig,
    sender: Arc<dyn RequestSender>,
    runtime: RuntimeContext,
}

impl std::fmt::Debug for ScenarioEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScenarioEngine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ScenarioEngine {
    pub fn new(config: EngineConfig, sender: Arc<dyn RequestSender>) -> Self {
        Self {
            config,
            sender,
            runtime: RuntimeContext::default(),
        }
    }

    pub fn with_runtime(mut self, runtime: RuntimeContext) -> Self {
        self.runtime = runtime;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Execute `scenario` to a terminal status.
    ///
    /// Missing servers and missing required parameters are rejected before
    /// any step runs. Step failures never surface as `Err`; they are
    /// recorded on the step result and reflected in the overall status.
    pub async fn execute(
        &self,
        scenario: &Scenario,
        servers: &ServerMap,
        params: HashMap<String, Value>,
        options: ExecutionOptions,
    ) -> ScenarioResult<OverallResult> {
        let ExecutionOptions {
            step_mode_overrides,
            stop_on_error,
            observer,
            control,
        } = options;

        if let Err(err) = check_servers(scenario, servers) {
            error!(scenario_id = %scenario.id, "{}", err);
            observer.on_error(&err.to_string(), None);
            return Err(err);
        }

        let params = match apply_parameter_defaults(scenario, params) {
            Ok(params) => params,
            Err(err) => {
                error!(scenario_id = %scenario.id, "{}", err);
                observer.on_error(&err.to_string(), None);
                return Err(err);
            }
        };

        let execution_id = self.runtime.id_generator.next_id();
        let started_at = self.runtime.now();
        info!(
            scenario_id = %scenario.id,
            execution_id = %execution_id,
            steps = scenario.steps.len(),
            "Scenario run started"
        );

        let mut run = Run {
            engine: self,
            scenario,
            servers,
            observer: observer.as_ref(),
            control: &control,
            ctx: ExecutionContext::new(params, step_mode_overrides),
            flow: FlowGraph::build(scenario),
            results: Vec::new(),
            visits: 0,
            stop_on_error: stop_on_error.unwrap_or(self.config.stop_on_error),
        };

        if self.config.verify_topology {
            for violation in verify_topology(scenario) {
                run.log(LogLevel::Warn, format!("Topology: {}", violation), None);
            }
        }

        observer.on_status_change(OverallStatus::Running);
        let outcome = run.run_from_start().await;

        let (status, error_message) = match outcome {
            Ok(()) => (OverallStatus::Success, None),
            Err(Abort::Cancelled) => (OverallStatus::Cancelled, None),
            Err(Abort::Failed { message, .. }) => (OverallStatus::Failed, Some(message)),
        };
        control.finish(match status {
            OverallStatus::Success => ControlState::Completed,
            OverallStatus::Cancelled => ControlState::Cancelled,
            _ => ControlState::Failed,
        });

        let completed_at = self.runtime.now();
        run.log(
            if status == OverallStatus::Success {
                LogLevel::Info
            } else {
                LogLevel::Warn
            },
            format!("Scenario run finished: {}", status),
            None,
        );
        observer.on_status_change(status);

        let Run { ctx, results, .. } = run;
        Ok(OverallResult {
            execution_id,
            scenario_id: scenario.id.clone(),
            status,
            results,
            saved_responses: ctx.saved_responses,
            error: error_message,
            started_at,
            completed_at,
        })
    }
}

/// Every server a `request` step names must be present in `servers`.
pub fn check_servers(scenario: &Scenario, servers: &ServerMap) -> ScenarioResult<()> {
    let missing: Vec<String> = scenario
        .referenced_server_ids()
        .into_iter()
        .filter(|id| !servers.contains_key(*id))
        .map(str::to_string)
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(ScenarioError::MissingServers { missing })
    }
}

/// Fill declared defaults and reject required parameters that are still
/// missing.
pub fn apply_parameter_defaults(
    scenario: &Scenario,
    mut params: HashMap<String, Value>,
) -> ScenarioResult<HashMap<String, Value>> {
    let mut missing = Vec::new();
    for definition in &scenario.parameter_schema {
        if params.contains_key(&definition.name) {
            continue;
        }
        match &definition.default_value {
            Some(value) => {
                params.insert(definition.name.clone(), value.clone());
            }
            None if definition.required => missing.push(definition.name.clone()),
            None => {}
        }
    }
    if missing.is_empty() {
        Ok(params)
    } else {
        missing.sort();
        Err(ScenarioError::MissingParameters { missing })
    }
}

/// Why a run stopped early.
#[derive(Debug)]
enum Abort {
    Cancelled,
    /// `cause` is the error of the step that ended the run.
    Failed { message: String, cause: ErrorContext },
}

impl Abort {
    fn internal(message: String) -> Self {
        let cause = ErrorContext::new(ErrorCode::InternalError, message.clone());
        Abort::Failed { message, cause }
    }
}

/// Where to go after a step.
#[derive(Debug)]
enum Transition {
    /// Follow a branch to this step.
    Jump(String),
    /// Top level: the handle-less edge. Inside a container: the next child.
    Default,
}

/// How a container body ended.
#[derive(Debug)]
enum SequenceOutcome {
    Completed,
    /// A branch left the body towards this step.
    Escaped(String),
}

#[derive(Debug, Clone, Copy)]
struct Iteration {
    current: usize,
    total: Option<usize>,
}

type StepFuture<'b> = BoxFuture<'b, Result<Transition, Abort>>;

struct Run<'a> {
    engine: &'a ScenarioEngine,
    scenario: &'a Scenario,
    servers: &'a ServerMap,
    observer: &'a dyn ExecutionObserver,
    control: &'a ExecutionControl,
    ctx: ExecutionContext,
    flow: FlowGraph,
    results: Vec<StepExecutionResult>,
    visits: usize,
    stop_on_error: bool,
}

impl<'a> Run<'a> {
    async fn run_from_start(&mut self) -> Result<(), Abort> {
        let scenario = self.scenario;
        let start = if scenario.contains_step(&scenario.start_step_id) {
            Some(scenario.start_step_id.clone())
        } else {
            let fallback = scenario.root_step_ids().first().map(|id| id.to_string());
            if let Some(id) = &fallback {
                self.log(
                    LogLevel::Warn,
                    format!(
                        "Start step '{}' not found, starting at '{}'",
                        scenario.start_step_id, id
                    ),
                    None,
                );
            }
            fallback
        };

        let mut current = start;
        while let Some(step_id) = current {
            current = match self.visit(&step_id, None).await? {
                Transition::Jump(target) => Some(target),
                Transition::Default => scenario.default_successor(&step_id).map(str::to_string),
            };
        }
        Ok(())
    }

    /// Run one step, whatever its type.
    fn visit<'b>(&'b mut self, step_id: &'b str, iteration: Option<Iteration>) -> StepFuture<'b> {
        async move {
            self.checkpoint().await?;

            self.visits += 1;
            if self.visits > self.engine.config.max_steps {
                let message = format!(
                    "Maximum step count exceeded ({})",
                    self.engine.config.max_steps
                );
                self.log(LogLevel::Error, message.clone(), Some(step_id));
                self.observer.on_error(&message, Some(step_id));
                return Err(Abort::internal(message));
            }

            let scenario = self.scenario;
            let Some(step) = scenario.step(step_id) else {
                let message = format!("Step not found: {}", step_id);
                self.log(LogLevel::Error, message.clone(), Some(step_id));
                self.observer.on_error(&message, Some(step_id));
                return Err(Abort::internal(message));
            };
            self.ctx.current_step_id = Some(step.id.clone());

            if self.ctx.effective_mode(step) == ExecutionMode::Manual {
                self.await_manual_resume(step, iteration).await?;
            }

            self.observer.on_step_start(&step.id, StepStatus::Running);
            debug!(step_id = %step.id, step_type = step.type_name(), "Step started");

            match &step.kind {
                StepKind::Request(request) => self.run_request(step, request, iteration).await,
                StepKind::Condition(condition) => {
                    self.run_condition(step, &condition.branches, iteration)
                }
                StepKind::Loop(loop_step) => self.run_loop(step, loop_step, iteration).await,
                StepKind::Group(group) => {
                    let mut result = self.begin(step, iteration);
                    let outcome = match self.run_sequence(&group.step_ids, iteration).await {
                        Ok(outcome) => outcome,
                        Err(abort) => return Err(self.abort_container(result, abort)),
                    };
                    result.status = StepStatus::Success;
                    self.complete(result);
                    Ok(match outcome {
                        SequenceOutcome::Completed => Transition::Default,
                        SequenceOutcome::Escaped(target) => Transition::Jump(target),
                    })
                }
            }
        }
        .boxed()
    }

    /// Pause and stop are observed here, between steps.
    async fn checkpoint(&mut self) -> Result<(), Abort> {
        if self.control.is_stopped() {
            return Err(Abort::Cancelled);
        }
        if self.control.is_paused() {
            self.log(LogLevel::Info, "Execution paused", None);
            self.observer.on_status_change(OverallStatus::Paused);
            if !self.control.wait_until_runnable().await {
                return Err(Abort::Cancelled);
            }
            self.log(LogLevel::Info, "Execution resumed", None);
            self.observer.on_status_change(OverallStatus::Running);
        }
        Ok(())
    }

    async fn await_manual_resume(
        &mut self,
        step: &Step,
        iteration: Option<Iteration>,
    ) -> Result<(), Abort> {
        // Suspend before announcing the wait so a resume sent in reaction to
        // the waiting event is not lost.
        self.control.suspend();
        self.observer.on_status_change(OverallStatus::Paused);

        let mut waiting = self.begin(step, iteration);
        waiting.status = StepStatus::Waiting;
        self.ctx.record(waiting.clone());
        self.observer.on_step_start(&step.id, StepStatus::Waiting);
        self.log(LogLevel::Info, "Waiting for manual resume", Some(&step.id));

        if !self.control.wait_until_runnable().await {
            waiting.status = StepStatus::Cancelled;
            waiting.error = Some(StepError::Cancelled.to_context());
            self.complete(waiting);
            return Err(Abort::Cancelled);
        }
        self.observer.on_status_change(OverallStatus::Running);
        Ok(())
    }

    /// Children in order. A jump to a sibling moves within the body; any
    /// other jump ends the body.
    async fn run_sequence(
        &mut self,
        children: &'a [String],
        iteration: Option<Iteration>,
    ) -> Result<SequenceOutcome, Abort> {
        let mut index = 0;
        while let Some(child_id) = children.get(index) {
            match self.visit(child_id, iteration).await? {
                Transition::Default => index += 1,
                Transition::Jump(target) => match children.iter().position(|c| *c == target) {
                    Some(position) => index = position,
                    None => return Ok(SequenceOutcome::Escaped(target)),
                },
            }
        }
        Ok(SequenceOutcome::Completed)
    }

    async fn run_request(
        &mut self,
        step: &'a Step,
        request: &'a RequestStep,
        iteration: Option<Iteration>,
    ) -> Result<Transition, Abort> {
        let mut result = self.begin(step, iteration);

        let Some(server) = self.servers.get(&request.server_id) else {
            let err = StepError::Config(format!("server not found: {}", request.server_id));
            return self.fail(result, err);
        };

        let record = match self.prepare_request(request, server) {
            Ok(record) => record,
            Err(err) => return self.fail(result, err),
        };
        result.request = Some(record.clone());
        let timeout = effective_timeout(request, server, self.engine.config.default_timeout_ms);

        if !request.wait_for_response {
            let sender = Arc::clone(&self.engine.sender);
            let step_id = step.id.clone();
            tokio::spawn(async move {
                if let Err(e) = sender.send(&record, timeout).await {
                    warn!(step_id = %step_id, error = %e, "Fire-and-forget request failed");
                }
            });
            result.status = StepStatus::Success;
            self.complete(result);
            return Ok(Transition::Default);
        }

        let response = match self.engine.sender.send(&record, timeout).await {
            Ok(response) => response,
            Err(err) => return self.fail(result, err),
        };

        let response_value = response.to_value();
        if request.save_response {
            let alias = request
                .response_alias
                .as_deref()
                .filter(|a| !a.trim().is_empty())
                .unwrap_or(&step.id);
            self.ctx.save_response(alias, response_value.clone());
            debug!(step_id = %step.id, alias, "Response saved");
        }

        let status_error = (!response.is_success()).then(|| StepError::HttpStatus {
            status: response.status,
            message: format!("{} {} returned {}", record.method.as_str(), record.url, response.status),
        });
        result.response = Some(response);

        let selection = if request.branches.is_empty() {
            Ok(BranchSelection::NoMatch)
        } else {
            let scope = WithResponse::new(&self.ctx, &response_value);
            evaluate_branches(&request.branches, &scope)
        };
        let selection = match selection {
            Ok(selection) => selection,
            Err(err) => return self.fail(result, err),
        };
        let transition = self.take_branch(step, &request.branches, &selection, &mut result);

        match status_error {
            Some(err) => {
                self.fail(result, err)?;
            }
            None => {
                result.status = StepStatus::Success;
                self.complete(result);
            }
        }
        self.skip_diverged(&request.branches, &transition);
        Ok(transition)
    }

    fn run_condition(
        &mut self,
        step: &Step,
        branches: &[Branch],
        iteration: Option<Iteration>,
    ) -> Result<Transition, Abort> {
        let mut result = self.begin(step, iteration);
        let selection = match evaluate_branches(branches, &self.ctx) {
            Ok(selection) => selection,
            Err(err) => return self.fail(result, err),
        };

        if selection == BranchSelection::NoMatch {
            self.log(
                LogLevel::Info,
                "No branch matched and no default branch, step skipped",
                Some(&step.id),
            );
            result.status = StepStatus::Skipped;
            self.complete(result);
            return Ok(Transition::Default);
        }

        let transition = self.take_branch(step, branches, &selection, &mut result);
        result.status = StepStatus::Success;
        self.complete(result);
        self.skip_diverged(branches, &transition);
        Ok(transition)
    }

    /// Record the chosen branch on `result` and turn it into a transition.
    fn take_branch(
        &self,
        step: &Step,
        branches: &[Branch],
        selection: &BranchSelection,
        result: &mut StepExecutionResult,
    ) -> Transition {
        let Some(branch) = selection.index().and_then(|i| branches.get(i)) else {
            return Transition::Default;
        };
        result.selected_branch = Some(branch.id.clone());
        self.log(
            LogLevel::Debug,
            format!("Branch '{}' selected", branch.id),
            Some(&step.id),
        );
        if branch.has_target() {
            Transition::Jump(branch.next_step_id.clone())
        } else {
            Transition::Default
        }
    }

    /// Once a branch jump is taken, targets of the other branches that can
    /// no longer be reached are reported as skipped.
    fn skip_diverged(&mut self, branches: &[Branch], transition: &Transition) {
        let Transition::Jump(taken) = transition else {
            return;
        };
        for other in branches {
            let target = other.next_step_id.as_str();
            if !other.has_target()
                || target == taken
                || self.ctx.step_results.contains_key(target)
                || self.flow.reachable(taken, target)
            {
                continue;
            }
            let skipped = StepExecutionResult::skipped(target, self.engine.runtime.now());
            self.complete(skipped);
        }
    }

    async fn run_loop(
        &mut self,
        step: &'a Step,
        loop_step: &'a LoopStep,
        iteration: Option<Iteration>,
    ) -> Result<Transition, Abort> {
        let mut result = self.begin(step, iteration);

        let plan = match self.loop_plan(&loop_step.config) {
            Ok(plan) => plan,
            Err(err) => return self.fail(result, err),
        };
        let total = plan.total();
        let max_iterations = self.engine.config.max_loop_iterations;

        self.ctx.push_loop_scope(LoopScope {
            loop_id: step.id.clone(),
            variables: HashMap::new(),
        });

        let mut completed = 0;
        let mut outcome = SequenceOutcome::Completed;
        loop {
            match (&plan, total) {
                (_, Some(total)) if completed >= total => break,
                (LoopPlan::While(condition), None) => {
                    if completed >= max_iterations {
                        self.ctx.pop_loop_scope();
                        return self.fail(result, StepError::LoopLimitExceeded(max_iterations));
                    }
                    match evaluate_condition(condition, &self.ctx) {
                        Ok(true) => {}
                        Ok(false) => break,
                        Err(err) => {
                            self.ctx.pop_loop_scope();
                            return self.fail(result, err);
                        }
                    }
                }
                _ => {}
            }

            self.bind_loop_variables(step, loop_step, &plan, completed);
            debug!(step_id = %step.id, iteration = completed, "Loop iteration");

            let current = Iteration {
                current: completed,
                total,
            };
            let body = self.run_sequence(&loop_step.step_ids, Some(current)).await;
            completed += 1;
            match body {
                Ok(SequenceOutcome::Completed) => {}
                Ok(SequenceOutcome::Escaped(target)) => {
                    outcome = SequenceOutcome::Escaped(target);
                    break;
                }
                Err(abort) => {
                    self.ctx.pop_loop_scope();
                    result.current_iteration = Some(completed - 1);
                    return Err(self.abort_container(result, abort));
                }
            }
        }
        self.ctx.pop_loop_scope();

        result.iterations = Some(completed);
        result.current_iteration = completed.checked_sub(1);
        result.status = StepStatus::Success;
        self.log(
            LogLevel::Info,
            format!("Loop finished after {} iteration(s)", completed),
            Some(&step.id),
        );
        self.complete(result);
        Ok(match outcome {
            SequenceOutcome::Completed => Transition::Default,
            SequenceOutcome::Escaped(target) => Transition::Jump(target),
        })
    }

    fn loop_plan(&self, config: &'a LoopConfig) -> Result<LoopPlan<'a>, StepError> {
        let max_iterations = self.engine.config.max_loop_iterations;
        let plan = match config {
            LoopConfig::Count { count } => {
                let n = match count {
                    LoopCount::Fixed(n) => usize::try_from(*n).unwrap_or(usize::MAX),
                    LoopCount::Reference(reference) => {
                        let value = lookup_reference(reference, &self.ctx).ok_or_else(|| {
                            StepError::VariableResolution(reference.clone())
                        })?;
                        to_f64(value)
                            .filter(|n| *n >= 0.0 && n.fract() == 0.0)
                            .map(|n| n as usize)
                            .ok_or_else(|| {
                                StepError::InvalidLoopSource(format!(
                                    "count '{}' is not a non-negative integer",
                                    reference
                                ))
                            })?
                    }
                };
                LoopPlan::Count(n)
            }
            LoopConfig::ForEach { source } => {
                let value = lookup_reference(source, &self.ctx)
                    .ok_or_else(|| StepError::VariableResolution(source.clone()))?;
                match value {
                    Value::Array(items) => LoopPlan::ForEach(items.clone()),
                    other => {
                        return Err(StepError::InvalidLoopSource(format!(
                            "'{}' resolved to {} instead of an array",
                            source,
                            json_type_name(other)
                        )))
                    }
                }
            }
            LoopConfig::While { condition } => LoopPlan::While(condition),
        };
        if plan.total().is_some_and(|n| n > max_iterations) {
            return Err(StepError::LoopLimitExceeded(max_iterations));
        }
        Ok(plan)
    }

    fn bind_loop_variables(
        &mut self,
        step: &Step,
        loop_step: &LoopStep,
        plan: &LoopPlan<'_>,
        index: usize,
    ) {
        let name = loop_step.variable_name.trim();
        if name.is_empty() {
            return;
        }
        let Some(scope) = self.ctx.loop_scope_mut(&step.id) else {
            return;
        };
        let value = match plan {
            LoopPlan::ForEach(items) => items.get(index).cloned().unwrap_or(Value::Null),
            _ => Value::from(index),
        };
        scope.variables.insert(name.to_string(), value);
        scope
            .variables
            .insert(format!("{}_index", name), Value::from(index));
    }

    fn prepare_request(
        &self,
        request: &RequestStep,
        server: &ServerConfig,
    ) -> Result<RequestRecord, StepError> {
        let endpoint = resolve_string(&request.endpoint, &self.ctx)?;

        let mut resolved_server = server.clone();
        for value in resolved_server.headers.values_mut() {
            *value = resolve_string(value, &self.ctx)?;
        }
        let step_headers = request
            .headers
            .iter()
            .filter(|h| h.enabled && !h.key.trim().is_empty())
            .map(|h| {
                Ok((
                    resolve_string(h.key.trim(), &self.ctx)?,
                    resolve_string(&h.value, &self.ctx)?,
                ))
            })
            .collect::<Result<Vec<_>, StepError>>()?;

        let body = request
            .body
            .as_ref()
            .map(|b| resolve_value(b, &self.ctx))
            .transpose()?;

        Ok(RequestRecord {
            method: request.method,
            url: resolved_server.url_for(&endpoint),
            headers: merge_headers(&resolved_server, step_headers),
            body,
        })
    }

    fn begin(&self, step: &Step, iteration: Option<Iteration>) -> StepExecutionResult {
        let mut result = StepExecutionResult::new(step.id.clone(), StepStatus::Running);
        result.started_at = Some(self.engine.runtime.now());
        if let Some(iteration) = iteration {
            result.current_iteration = Some(iteration.current);
            result.iterations = iteration.total;
        }
        result
    }

    fn complete(&mut self, mut result: StepExecutionResult) {
        result.completed_at = Some(self.engine.runtime.now());
        match result.status {
            StepStatus::Failed => {}
            StepStatus::Skipped => {
                self.log(LogLevel::Info, "Step skipped", Some(&result.step_id));
            }
            status => {
                info!(step_id = %result.step_id, status = ?status, "Step finished");
            }
        }
        self.ctx.record(result.clone());
        self.observer.on_step_complete(&result.step_id, &result);
        self.results.push(result);
    }

    /// Record a failed step. The run continues with the default successor
    /// unless stop-on-error is set.
    fn fail(
        &mut self,
        mut result: StepExecutionResult,
        err: StepError,
    ) -> Result<Transition, Abort> {
        let message = err.to_string();
        let cause = err.to_context();
        result.status = StepStatus::Failed;
        result.error = Some(cause.clone());
        let step_id = result.step_id.clone();
        self.log(LogLevel::Error, format!("Step failed: {}", message), Some(&step_id));
        self.observer.on_error(&message, Some(&step_id));
        self.complete(result);

        if self.stop_on_error {
            Err(Abort::Failed {
                message: format!("Step '{}' failed: {}", step_id, message),
                cause,
            })
        } else {
            Ok(Transition::Default)
        }
    }

    /// Close a container whose body aborted the run.
    fn abort_container(&mut self, mut result: StepExecutionResult, abort: Abort) -> Abort {
        match &abort {
            Abort::Cancelled => {
                result.status = StepStatus::Cancelled;
                result.error = Some(StepError::Cancelled.to_context());
            }
            Abort::Failed { message, cause } => {
                result.status = StepStatus::Failed;
                result.error = Some(ErrorContext {
                    message: message.clone(),
                    ..cause.clone()
                });
            }
        }
        self.complete(result);
        abort
    }

    /// Emit through `tracing` and `on_log`.
    fn log(&self, level: LogLevel, message: impl Into<String>, step_id: Option<&str>) {
        let message = message.into();
        match level {
            LogLevel::Debug => debug!(step_id = step_id.unwrap_or(""), "{}", message),
            LogLevel::Info => info!(step_id = step_id.unwrap_or(""), "{}", message),
            LogLevel::Warn => warn!(step_id = step_id.unwrap_or(""), "{}", message),
            LogLevel::Error => error!(step_id = step_id.unwrap_or(""), "{}", message),
        }
        let entry = LogEntry::new(level, message, step_id, self.engine.runtime.now());
        self.observer.on_log(&entry);
    }
}

enum LoopPlan<'a> {
    Count(usize),
    ForEach(Vec<Value>),
    While(&'a crate::domain::model::BranchCondition),
}

impl LoopPlan<'_> {
    fn total(&self) -> Option<usize> {
        match self {
            LoopPlan::Count(n) => Some(*n),
            LoopPlan::ForEach(items) => Some(items.len()),
            LoopPlan::While(_) => None,
        }
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::event_bus::CollectingObserver;
    use crate::core::runtime_context::{FakeIdGenerator, FakeTimeProvider};
    use crate::domain::execution::ResponseRecord;
    use crate::domain::model::{BranchCondition, ComparisonOperator, Edge, HttpMethod};
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use parking_lot::Mutex;
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::time::Duration;

    /// Answers every request with the next scripted status (200 once the
    /// script runs out) and remembers what was sent.
    #[derive(Default)]
    struct ScriptedSender {
        statuses: Mutex<Vec<u16>>,
        sent: Mutex<Vec<RequestRecord>>,
    }

    impl ScriptedSender {
        fn with_statuses(statuses: Vec<u16>) -> Self {
            Self {
                statuses: Mutex::new(statuses),
                sent: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl RequestSender for ScriptedSender {
        async fn send(
            &self,
            request: &RequestRecord,
            _timeout: Duration,
        ) -> Result<ResponseRecord, StepError> {
            self.sent.lock().push(request.clone());
            let mut statuses = self.statuses.lock();
            let status = if statuses.is_empty() {
                200
            } else {
                statuses.remove(0)
            };
            Ok(ResponseRecord {
                status,
                headers: BTreeMap::new(),
                body: json!({"token": "abc", "items": [1, 2]}),
                duration_ms: 1,
            })
        }
    }

    fn engine(sender: Arc<ScriptedSender>) -> ScenarioEngine {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        ScenarioEngine::new(EngineConfig::default(), sender).with_runtime(RuntimeContext::new(
            Arc::new(FakeTimeProvider::with_step(start, chrono::Duration::milliseconds(1))),
            Arc::new(FakeIdGenerator::new("exec")),
        ))
    }

    fn servers() -> ServerMap {
        HashMap::from([(
            "api".to_string(),
            ServerConfig::new("api", "http://localhost:9999"),
        )])
    }

    fn request(id: &str, endpoint: &str) -> Step {
        Step::request(id, RequestStep::new("api", HttpMethod::Get, endpoint))
    }

    fn linear(ids: &[&str]) -> Scenario {
        let mut scenario = Scenario::new("s", "S");
        for id in ids {
            scenario.steps.push(request(id, &format!("/{}", id)));
        }
        for pair in ids.windows(2) {
            scenario.edges.push(Edge::new(
                format!("e-{}-{}", pair[0], pair[1]),
                pair[0],
                pair[1],
            ));
        }
        scenario.start_step_id = ids[0].to_string();
        scenario
    }

    #[tokio::test]
    async fn test_linear_run_emits_in_order() {
        let sender = Arc::new(ScriptedSender::default());
        let observer = Arc::new(CollectingObserver::new());
        let result = engine(sender.clone())
            .execute(
                &linear(&["a", "b"]),
                &servers(),
                HashMap::new(),
                ExecutionOptions::new().with_observer(observer.clone()),
            )
            .await
            .unwrap();

        assert_eq!(result.status, OverallStatus::Success);
        assert_eq!(result.execution_id, "exec-0");
        let completed: Vec<_> = observer.completed().into_iter().map(|(id, _)| id).collect();
        assert_eq!(completed, vec!["a", "b"]);
        assert_eq!(sender.sent.lock()[1].url, "http://localhost:9999/b");
    }

    #[tokio::test]
    async fn test_missing_required_parameter_rejected() {
        let mut scenario = linear(&["a"]);
        scenario.parameter_schema.push(
            serde_json::from_value(json!({"name": "token", "type": "string", "required": true}))
                .unwrap(),
        );
        let err = engine(Arc::new(ScriptedSender::default()))
            .execute(&scenario, &servers(), HashMap::new(), ExecutionOptions::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ScenarioError::MissingParameters { missing } if missing == vec!["token"]));
    }

    #[tokio::test]
    async fn test_parameter_default_is_applied() {
        let mut scenario = linear(&["a"]);
        if let StepKind::Request(r) = &mut scenario.steps[0].kind {
            r.endpoint = "/users/${userId}".into();
        }
        scenario.parameter_schema.push(
            serde_json::from_value(
                json!({"name": "userId", "type": "number", "defaultValue": 7}),
            )
            .unwrap(),
        );
        let sender = Arc::new(ScriptedSender::default());
        engine(sender.clone())
            .execute(&scenario, &servers(), HashMap::new(), ExecutionOptions::new())
            .await
            .unwrap();
        assert_eq!(sender.sent.lock()[0].url, "http://localhost:9999/users/7");
    }

    #[tokio::test]
    async fn test_http_error_fails_step_but_run_continues() {
        let sender = Arc::new(ScriptedSender::with_statuses(vec![500]));
        let result = engine(sender)
            .execute(&linear(&["a", "b"]), &servers(), HashMap::new(), ExecutionOptions::new())
            .await
            .unwrap();
        assert_eq!(result.status, OverallStatus::Success);
        assert_eq!(result.results[0].status, StepStatus::Failed);
        assert_eq!(result.results[0].error.as_ref().unwrap().http_status, Some(500));
        assert_eq!(result.results[1].status, StepStatus::Success);
    }

    #[tokio::test]
    async fn test_stop_on_error_aborts_run() {
        let sender = Arc::new(ScriptedSender::with_statuses(vec![404]));
        let result = engine(sender)
            .execute(
                &linear(&["a", "b"]),
                &servers(),
                HashMap::new(),
                ExecutionOptions::new().with_stop_on_error(true),
            )
            .await
            .unwrap();
        assert_eq!(result.status, OverallStatus::Failed);
        assert_eq!(result.results.len(), 1);
        assert!(result.error.unwrap().contains("'a'"));
    }

    #[tokio::test]
    async fn test_request_branch_sees_response() {
        let mut scenario = linear(&["a"]);
        scenario.steps.push(request("ok", "/ok"));
        scenario.steps.push(request("bad", "/bad"));
        if let StepKind::Request(r) = &mut scenario.steps[0].kind {
            let mut success = Branch::new(
                "success",
                BranchCondition::compare("response.status", ComparisonOperator::Equal, json!(200)),
            );
            success.next_step_id = "ok".into();
            let mut other = Branch::default_branch("other");
            other.next_step_id = "bad".into();
            r.branches = vec![success, other];
        }
        scenario
            .edges
            .push(Edge::new("e1", "a", "ok").with_handle("success"));
        scenario
            .edges
            .push(Edge::new("e2", "a", "bad").with_handle("other"));

        let result = engine(Arc::new(ScriptedSender::default()))
            .execute(&scenario, &servers(), HashMap::new(), ExecutionOptions::new())
            .await
            .unwrap();
        let statuses: Vec<_> = result
            .results
            .iter()
            .map(|r| (r.step_id.as_str(), r.status))
            .collect();
        assert_eq!(
            statuses,
            vec![
                ("a", StepStatus::Success),
                ("bad", StepStatus::Skipped),
                ("ok", StepStatus::Success),
            ]
        );
        assert_eq!(result.results[0].selected_branch.as_deref(), Some("success"));
    }

    #[tokio::test]
    async fn test_for_each_binds_items() {
        let mut scenario = Scenario::new("s", "S");
        scenario.steps.push(Step::loop_step(
            "loop",
            LoopConfig::ForEach {
                source: "${ids}".into(),
            },
            vec!["get".into()],
            "id",
        ));
        scenario.steps.push(request("get", "/items/${id}?n=${id_index}"));
        scenario.start_step_id = "loop".into();

        let sender = Arc::new(ScriptedSender::default());
        let result = engine(sender.clone())
            .execute(
                &scenario,
                &servers(),
                HashMap::from([("ids".to_string(), json!(["x", "y"]))]),
                ExecutionOptions::new(),
            )
            .await
            .unwrap();

        let urls: Vec<_> = sender.sent.lock().iter().map(|r| r.url.clone()).collect();
        assert_eq!(
            urls,
            vec![
                "http://localhost:9999/items/x?n=0",
                "http://localhost:9999/items/y?n=1",
            ]
        );
        let loop_result = result.results_for("loop").next().unwrap();
        assert_eq!(loop_result.iterations, Some(2));
    }

    #[tokio::test]
    async fn test_for_each_rejects_non_array() {
        let mut scenario = Scenario::new("s", "S");
        scenario.steps.push(Step::loop_step(
            "loop",
            LoopConfig::ForEach {
                source: "${ids}".into(),
            },
            vec![],
            "id",
        ));
        scenario.start_step_id = "loop".into();
        let result = engine(Arc::new(ScriptedSender::default()))
            .execute(
                &scenario,
                &servers(),
                HashMap::from([("ids".to_string(), json!("nope"))]),
                ExecutionOptions::new(),
            )
            .await
            .unwrap();
        assert_eq!(result.results[0].status, StepStatus::Failed);
    }

    #[tokio::test]
    async fn test_while_loop_hits_iteration_cap() {
        let mut scenario = Scenario::new("s", "S");
        scenario.steps.push(Step::loop_step(
            "loop",
            LoopConfig::While {
                condition: BranchCondition::compare("flag", ComparisonOperator::Equal, json!(true)),
            },
            vec![],
            "",
        ));
        scenario.start_step_id = "loop".into();

        let mut config = EngineConfig::default();
        config.max_loop_iterations = 5;
        let engine = ScenarioEngine::new(config, Arc::new(ScriptedSender::default()));
        let result = engine
            .execute(
                &scenario,
                &servers(),
                HashMap::from([("flag".to_string(), json!(true))]),
                ExecutionOptions::new(),
            )
            .await
            .unwrap();
        let error = result.results[0].error.as_ref().unwrap();
        assert_eq!(error.code, crate::error::ErrorCode::LoopLimitExceeded);
    }

    fn polling_loop(condition: BranchCondition) -> Scenario {
        let mut scenario = Scenario::new("s", "S");
        scenario.steps.push(Step::loop_step(
            "wait",
            LoopConfig::While { condition },
            vec!["poll".into()],
            "attempt",
        ));
        let mut poll = RequestStep::new("api", HttpMethod::Get, "/jobs/1?try=${attempt}");
        poll.save_response = true;
        scenario.steps.push(Step::request("poll", poll));
        scenario.start_step_id = "wait".into();
        scenario
    }

    #[tokio::test]
    async fn test_while_loop_ends_when_saved_response_flips_condition() {
        let scenario = polling_loop(BranchCondition::compare(
            "poll.status",
            ComparisonOperator::NotEqual,
            json!(200),
        ));
        let sender = Arc::new(ScriptedSender::with_statuses(vec![202, 202, 200]));
        let result = engine(sender.clone())
            .execute(&scenario, &servers(), HashMap::new(), ExecutionOptions::new())
            .await
            .unwrap();

        assert_eq!(result.status, OverallStatus::Success);
        let urls: Vec<_> = sender.sent.lock().iter().map(|r| r.url.clone()).collect();
        assert_eq!(
            urls,
            vec![
                "http://localhost:9999/jobs/1?try=0",
                "http://localhost:9999/jobs/1?try=1",
                "http://localhost:9999/jobs/1?try=2",
            ]
        );
        let wait = result.results_for("wait").next().unwrap();
        assert_eq!(wait.status, StepStatus::Success);
        assert_eq!(wait.iterations, Some(3));
        assert_eq!(wait.current_iteration, Some(2));
        assert_eq!(result.saved_responses["poll"]["status"], json!(200));
    }

    #[tokio::test]
    async fn test_while_condition_checked_before_first_pass() {
        let scenario = polling_loop(BranchCondition::compare(
            "keepGoing",
            ComparisonOperator::Equal,
            json!(true),
        ));
        let sender = Arc::new(ScriptedSender::default());
        let result = engine(sender.clone())
            .execute(
                &scenario,
                &servers(),
                HashMap::from([("keepGoing".to_string(), json!(false))]),
                ExecutionOptions::new(),
            )
            .await
            .unwrap();

        assert!(sender.sent.lock().is_empty());
        let wait = result.results_for("wait").next().unwrap();
        assert_eq!(wait.iterations, Some(0));
        assert_eq!(wait.current_iteration, None);
        assert_eq!(result.results_for("poll").count(), 0);
    }

    #[tokio::test]
    async fn test_resume_from_waiting_callback_is_not_lost() {
        let scenario = {
            let mut scenario = linear(&["a", "b"]);
            scenario.steps[0] = scenario.steps[0].clone().with_mode(ExecutionMode::Manual);
            scenario
        };
        let control = ExecutionControl::new();
        let resumer = control.clone();
        let observer = Arc::new(crate::core::event_bus::ExecutionCallbacks::new().on_step_start(
            move |_, status| {
                if status == StepStatus::Waiting {
                    resumer.resume().unwrap();
                }
            },
        ));

        let engine = engine(Arc::new(ScriptedSender::default()));
        let servers = servers();
        let run = engine.execute(
            &scenario,
            &servers,
            HashMap::new(),
            ExecutionOptions::new()
                .with_observer(observer)
                .with_control(control.clone()),
        );
        let result = tokio::time::timeout(Duration::from_secs(2), run)
            .await
            .expect("manual step stayed suspended")
            .unwrap();

        assert_eq!(result.status, OverallStatus::Success);
        let statuses: Vec<_> = result
            .results
            .iter()
            .map(|r| (r.step_id.as_str(), r.status))
            .collect();
        assert_eq!(
            statuses,
            vec![("a", StepStatus::Success), ("b", StepStatus::Success)]
        );
        assert_eq!(control.state(), ControlState::Completed);
    }

    #[tokio::test]
    async fn test_failed_container_keeps_child_error_code() {
        let mut scenario = Scenario::new("s", "S");
        scenario
            .steps
            .push(Step::group("checkout", vec!["pay".into()]));
        scenario.steps.push(request("pay", "/pay"));
        scenario.start_step_id = "checkout".into();

        let sender = Arc::new(ScriptedSender::with_statuses(vec![503]));
        let result = engine(sender)
            .execute(
                &scenario,
                &servers(),
                HashMap::new(),
                ExecutionOptions::new().with_stop_on_error(true),
            )
            .await
            .unwrap();

        assert_eq!(result.status, OverallStatus::Failed);
        let group = result.results_for("checkout").next().unwrap();
        assert_eq!(group.status, StepStatus::Failed);
        let error = group.error.as_ref().unwrap();
        assert_eq!(error.code, ErrorCode::HttpServerError);
        assert_eq!(error.http_status, Some(503));
        assert!(error.message.contains("'pay'"));
    }

    #[tokio::test]
    async fn test_edge_cycle_trips_step_guard() {
        let mut scenario = linear(&["a", "b"]);
        scenario.edges.push(Edge::new("back", "b", "a"));
        let mut config = EngineConfig::default();
        config.max_steps = 10;
        let engine = ScenarioEngine::new(config, Arc::new(ScriptedSender::default()));
        let result = engine
            .execute(&scenario, &servers(), HashMap::new(), ExecutionOptions::new())
            .await
            .unwrap();
        assert_eq!(result.status, OverallStatus::Failed);
        assert_eq!(result.results.len(), 10);
    }

    #[tokio::test]
    async fn test_fire_and_forget_does_not_save() {
        let mut scenario = linear(&["a"]);
        if let StepKind::Request(r) = &mut scenario.steps[0].kind {
            r.wait_for_response = false;
            r.save_response = true;
        }
        let result = engine(Arc::new(ScriptedSender::default()))
            .execute(&scenario, &servers(), HashMap::new(), ExecutionOptions::new())
            .await
            .unwrap();
        assert_eq!(result.results[0].status, StepStatus::Success);
        assert!(result.results[0].response.is_none());
        assert!(result.saved_responses.is_empty());
    }
}
