//! Handle to a scenario run spawned by [`ScenarioRunner`](super::ScenarioRunner).

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::core::control::{ControlState, ExecutionControl};
use crate::core::event_bus::{CollectingObserver, ExecutionEvent};
use crate::domain::execution::OverallResult;
use crate::error::{ScenarioError, ScenarioResult};

/// Allows pausing, resuming and stopping the run, polling its state, and
/// collecting the final [`OverallResult`].
pub struct ScenarioHandle {
    control: ExecutionControl,
    events: Option<Arc<CollectingObserver>>,
    task: JoinHandle<ScenarioResult<OverallResult>>,
}

impl ScenarioHandle {
    pub(crate) fn new(
        control: ExecutionControl,
        events: Option<Arc<CollectingObserver>>,
        task: JoinHandle<ScenarioResult<OverallResult>>,
    ) -> Self {
        Self {
            control,
            events,
            task,
        }
    }

    pub fn control(&self) -> &ExecutionControl {
        &self.control
    }

    /// Current control state (non-blocking).
    pub fn status(&self) -> ControlState {
        self.control.state()
    }

    pub fn subscribe(&self) -> watch::Receiver<ControlState> {
        self.control.subscribe()
    }

    pub fn pause(&self) -> ScenarioResult<()> {
        self.control.pause()
    }

    pub fn resume(&self) -> ScenarioResult<()> {
        self.control.resume()
    }

    pub fn stop(&self) -> ScenarioResult<()> {
        self.control.stop()
    }

    /// Snapshot of the events collected so far. Empty when collection was
    /// disabled on the builder.
    pub fn events(&self) -> Vec<ExecutionEvent> {
        self.events
            .as_ref()
            .map(|events| events.events())
            .unwrap_or_default()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the run to reach a terminal status.
    pub async fn wait(self) -> ScenarioResult<OverallResult> {
        self.task
            .await
            .map_err(|e| ScenarioError::InternalError(format!("scenario task failed: {}", e)))?
    }
}
