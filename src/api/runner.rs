//! High-level scenario runner and builder.
//!
//! [`ScenarioRunner`] wires the engine, the HTTP sender, observers and the
//! control handle together and spawns the run on the current tokio runtime.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::info;

use crate::api::handle::ScenarioHandle;
use crate::core::config::EngineConfig;
use crate::core::control::ExecutionControl;
use crate::core::engine::{apply_parameter_defaults, check_servers, ExecutionOptions, ScenarioEngine};
use crate::core::event_bus::{CollectingObserver, ExecutionObserver, FanoutObserver};
use crate::core::http_client::{HttpRequestSender, RequestSender};
use crate::core::runtime_context::RuntimeContext;
use crate::domain::model::{ExecutionMode, Scenario, ServerConfig, ServerMap};
use crate::dsl::validation::{validate_scenario, ValidationReport};
use crate::error::{ScenarioError, ScenarioResult};

/// Entry point for running a scenario.
///
/// Use [`ScenarioRunner::builder(scenario)`](Self::builder) to obtain a
/// [`ScenarioRunnerBuilder`].
pub struct ScenarioRunner;

impl ScenarioRunner {
    pub fn builder(scenario: Scenario) -> ScenarioRunnerBuilder {
        ScenarioRunnerBuilder {
            scenario,
            servers: ServerMap::new(),
            params: HashMap::new(),
            step_mode_overrides: HashMap::new(),
            stop_on_error: None,
            config: EngineConfig::default(),
            sender: None,
            runtime: None,
            observers: Vec::new(),
            control: None,
            collect_events: true,
        }
    }
}

/// Builder for configuring and launching a scenario run.
pub struct ScenarioRunnerBuilder {
    scenario: Scenario,
    servers: ServerMap,
    params: HashMap<String, Value>,
    step_mode_overrides: HashMap<String, ExecutionMode>,
    stop_on_error: Option<bool>,
    config: EngineConfig,
    sender: Option<Arc<dyn RequestSender>>,
    runtime: Option<RuntimeContext>,
    observers: Vec<Arc<dyn ExecutionObserver>>,
    control: Option<ExecutionControl>,
    collect_events: bool,
}

impl ScenarioRunnerBuilder {
    pub fn servers(mut self, servers: ServerMap) -> Self {
        self.servers = servers;
        self
    }

    pub fn server(mut self, server: ServerConfig) -> Self {
        self.servers.insert(server.id.clone(), server);
        self
    }

    /// Run parameters. Declared defaults fill whatever is missing.
    pub fn params(mut self, params: HashMap<String, Value>) -> Self {
        self.params = params;
        self
    }

    pub fn param(mut self, name: impl Into<String>, value: Value) -> Self {
        self.params.insert(name.into(), value);
        self
    }

    pub fn step_mode(mut self, step_id: impl Into<String>, mode: ExecutionMode) -> Self {
        self.step_mode_overrides.insert(step_id.into(), mode);
        self
    }

    pub fn stop_on_error(mut self, stop_on_error: bool) -> Self {
        self.stop_on_error = Some(stop_on_error);
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the reqwest-backed sender, e.g. with a scripted one in tests.
    pub fn sender(mut self, sender: Arc<dyn RequestSender>) -> Self {
        self.sender = Some(sender);
        self
    }

    pub fn runtime(mut self, runtime: RuntimeContext) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn observer(mut self, observer: Arc<dyn ExecutionObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Use an existing control instead of a fresh one.
    pub fn control(mut self, control: ExecutionControl) -> Self {
        self.control = Some(control);
        self
    }

    /// Whether the handle keeps a copy of every event (default: on).
    pub fn collect_events(mut self, enabled: bool) -> Self {
        self.collect_events = enabled;
        self
    }

    /// Validate the scenario without running it.
    pub fn validate(&self) -> ValidationReport {
        validate_scenario(&self.scenario)
    }

    /// Check the scenario and launch it, returning a [`ScenarioHandle`].
    ///
    /// Validation errors, missing servers and missing required parameters
    /// are reported here and nothing runs.
    pub async fn run(self) -> ScenarioResult<ScenarioHandle> {
        let report = self.validate();
        if !report.is_valid {
            return Err(ScenarioError::ValidationFailed(Box::new(report)));
        }
        self.config.validate()?;
        check_servers(&self.scenario, &self.servers)?;
        apply_parameter_defaults(&self.scenario, self.params.clone())?;

        let sender: Arc<dyn RequestSender> = match self.sender {
            Some(sender) => sender,
            None => Arc::new(HttpRequestSender::new(&self.config.http)?),
        };
        let mut engine = ScenarioEngine::new(self.config, sender);
        if let Some(runtime) = self.runtime {
            engine = engine.with_runtime(runtime);
        }

        let mut observers = self.observers;
        let events = self.collect_events.then(|| Arc::new(CollectingObserver::new()));
        if let Some(events) = &events {
            observers.push(events.clone());
        }
        let observer: Arc<dyn ExecutionObserver> = Arc::new(FanoutObserver::new(observers));

        let control = self.control.unwrap_or_default();
        let mut options = ExecutionOptions::new()
            .with_observer(observer)
            .with_control(control.clone());
        options.step_mode_overrides = self.step_mode_overrides;
        options.stop_on_error = self.stop_on_error;

        let scenario = self.scenario;
        let servers = self.servers;
        let params = self.params;
        info!(scenario_id = %scenario.id, "Launching scenario run");
        let task = tokio::spawn(async move {
            engine
                .execute(&scenario, &servers, params, options)
                .await
        });

        Ok(ScenarioHandle::new(control, events, task))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::control::ControlState;
    use crate::domain::execution::OverallStatus;
    use crate::domain::model::{HttpMethod, RequestStep, Step};

    fn single_request(server_id: &str) -> Scenario {
        let mut scenario = Scenario::new("s", "S");
        scenario.steps.push(Step::request(
            "a",
            RequestStep::new(server_id, HttpMethod::Get, "/health"),
        ));
        scenario.start_step_id = "a".into();
        scenario
    }

    #[tokio::test]
    async fn test_missing_server_rejected_before_launch() {
        let err = ScenarioRunner::builder(single_request("api"))
            .run()
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ScenarioError::MissingServers { missing } if missing == vec!["api"]));
    }

    #[tokio::test]
    async fn test_run_against_mock_server() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/health")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"ok":true}"#)
            .create_async()
            .await;

        let handle = ScenarioRunner::builder(single_request("api"))
            .server(ServerConfig::new("api", server.url()))
            .run()
            .await
            .unwrap();
        let control = handle.control().clone();
        let result = handle.wait().await.unwrap();

        mock.assert_async().await;
        assert_eq!(result.status, OverallStatus::Success);
        assert_eq!(control.state(), ControlState::Completed);
        assert_eq!(
            result.results[0].response.as_ref().unwrap().body["ok"],
            serde_json::json!(true)
        );
    }

    #[tokio::test]
    async fn test_events_collected_by_default() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/health")
            .with_status(204)
            .create_async()
            .await;

        let handle = ScenarioRunner::builder(single_request("api"))
            .server(ServerConfig::new("api", server.url()))
            .run()
            .await
            .unwrap();
        while !handle.is_finished() {
            tokio::task::yield_now().await;
        }
        assert!(!handle.events().is_empty());
        handle.wait().await.unwrap();
    }
}
