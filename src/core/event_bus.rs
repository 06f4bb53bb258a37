//! The host-facing event boundary of the engine.
//!
//! The engine reports progress only through an [`ExecutionObserver`]. Hosts
//! either implement the trait, pass closures via [`ExecutionCallbacks`], or
//! consume [`ExecutionEvent`]s from a channel.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::domain::execution::{OverallStatus, StepExecutionResult, StepStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// Log line delivered through `on_log`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl LogEntry {
    pub fn new(
        level: LogLevel,
        message: impl Into<String>,
        step_id: Option<&str>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            level,
            message: message.into(),
            step_id: step_id.map(str::to_string),
            timestamp,
        }
    }
}

/// Everything the engine reports, in emission order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExecutionEvent {
    StepStarted {
        step_id: String,
        status: StepStatus,
    },
    StepCompleted {
        step_id: String,
        result: StepExecutionResult,
    },
    Log(LogEntry),
    Error {
        message: String,
        step_id: Option<String>,
    },
    StatusChanged {
        status: OverallStatus,
    },
}

/// Receiver of engine progress. All methods default to no-ops.
pub trait ExecutionObserver: Send + Sync {
    fn on_step_start(&self, _step_id: &str, _status: StepStatus) {}
    fn on_step_complete(&self, _step_id: &str, _result: &StepExecutionResult) {}
    fn on_log(&self, _entry: &LogEntry) {}
    fn on_error(&self, _message: &str, _step_id: Option<&str>) {}
    fn on_status_change(&self, _status: OverallStatus) {}
}

pub struct NoopObserver;

impl ExecutionObserver for NoopObserver {}

type StepStartFn = Box<dyn Fn(&str, StepStatus) + Send + Sync>;
type StepCompleteFn = Box<dyn Fn(&str, &StepExecutionResult) + Send + Sync>;
type LogFn = Box<dyn Fn(&LogEntry) + Send + Sync>;
type ErrorFn = Box<dyn Fn(&str, Option<&str>) + Send + Sync>;
type StatusFn = Box<dyn Fn(OverallStatus) + Send + Sync>;

/// Closure-based observer; unset callbacks are skipped.
#[derive(Default)]
pub struct ExecutionCallbacks {
    on_step_start: Option<StepStartFn>,
    on_step_complete: Option<StepCompleteFn>,
    on_log: Option<LogFn>,
    on_error: Option<ErrorFn>,
    on_status_change: Option<StatusFn>,
}

impl fmt::Debug for ExecutionCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionCallbacks")
            .field("on_step_start", &self.on_step_start.is_some())
            .field("on_step_complete", &self.on_step_complete.is_some())
            .field("on_log", &self.on_log.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_status_change", &self.on_status_change.is_some())
            .finish()
    }
}

impl ExecutionCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_step_start(mut self, f: impl Fn(&str, StepStatus) + Send + Sync + 'static) -> Self {
        self.on_step_start = Some(Box::new(f));
        self
    }

    pub fn on_step_complete(
        mut self,
        f: impl Fn(&str, &StepExecutionResult) + Send + Sync + 'static,
    ) -> Self {
        self.on_step_complete = Some(Box::new(f));
        self
    }

    pub fn on_log(mut self, f: impl Fn(&LogEntry) + Send + Sync + 'static) -> Self {
        self.on_log = Some(Box::new(f));
        self
    }

    pub fn on_error(mut self, f: impl Fn(&str, Option<&str>) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }

    pub fn on_status_change(mut self, f: impl Fn(OverallStatus) + Send + Sync + 'static) -> Self {
        self.on_status_change = Some(Box::new(f));
        self
    }
}

impl ExecutionObserver for ExecutionCallbacks {
    fn on_step_start(&self, step_id: &str, status: StepStatus) {
        if let Some(f) = &self.on_step_start {
            f(step_id, status);
        }
    }

    fn on_step_complete(&self, step_id: &str, result: &StepExecutionResult) {
        if let Some(f) = &self.on_step_complete {
            f(step_id, result);
        }
    }

    fn on_log(&self, entry: &LogEntry) {
        if let Some(f) = &self.on_log {
            f(entry);
        }
    }

    fn on_error(&self, message: &str, step_id: Option<&str>) {
        if let Some(f) = &self.on_error {
            f(message, step_id);
        }
    }

    fn on_status_change(&self, status: OverallStatus) {
        if let Some(f) = &self.on_status_change {
            f(status);
        }
    }
}

/// Event sender
pub type EventSender = mpsc::UnboundedSender<ExecutionEvent>;

/// Event receiver
pub type EventReceiver = mpsc::UnboundedReceiver<ExecutionEvent>;

/// Create an event channel
pub fn create_event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Forwards every callback as an [`ExecutionEvent`]. A dropped receiver is ignored.
pub struct ChannelObserver {
    tx: EventSender,
}

impl ChannelObserver {
    pub fn new(tx: EventSender) -> Self {
        Self { tx }
    }

    fn send(&self, event: ExecutionEvent) {
        let _ = self.tx.send(event);
    }
}

impl ExecutionObserver for ChannelObserver {
    fn on_step_start(&self, step_id: &str, status: StepStatus) {
        self.send(ExecutionEvent::StepStarted {
            step_id: step_id.to_string(),
            status,
        });
    }

    fn on_step_complete(&self, step_id: &str, result: &StepExecutionResult) {
        self.send(ExecutionEvent::StepCompleted {
            step_id: step_id.to_string(),
            result: result.clone(),
        });
    }

    fn on_log(&self, entry: &LogEntry) {
        self.send(ExecutionEvent::Log(entry.clone()));
    }

    fn on_error(&self, message: &str, step_id: Option<&str>) {
        self.send(ExecutionEvent::Error {
            message: message.to_string(),
            step_id: step_id.map(str::to_string),
        });
    }

    fn on_status_change(&self, status: OverallStatus) {
        self.send(ExecutionEvent::StatusChanged { status });
    }
}

/// Keeps every event in memory.
#[derive(Default)]
pub struct CollectingObserver {
    events: Mutex<Vec<ExecutionEvent>>,
}

impl CollectingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ExecutionEvent> {
        self.events.lock().clone()
    }

    /// `(step_id, status)` of every `on_step_start`, in order.
    pub fn started(&self) -> Vec<(String, StepStatus)> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                ExecutionEvent::StepStarted { step_id, status } => Some((step_id.clone(), *status)),
                _ => None,
            })
            .collect()
    }

    /// `(step_id, status)` of every `on_step_complete`, in order.
    pub fn completed(&self) -> Vec<(String, StepStatus)> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                ExecutionEvent::StepCompleted { step_id, result } => {
                    Some((step_id.clone(), result.status))
                }
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: ExecutionEvent) {
        self.events.lock().push(event);
    }
}

impl ExecutionObserver for CollectingObserver {
    fn on_step_start(&self, step_id: &str, status: StepStatus) {
        self.push(ExecutionEvent::StepStarted {
            step_id: step_id.to_string(),
            status,
        });
    }

    fn on_step_complete(&self, step_id: &str, result: &StepExecutionResult) {
        self.push(ExecutionEvent::StepCompleted {
            step_id: step_id.to_string(),
            result: result.clone(),
        });
    }

    fn on_log(&self, entry: &LogEntry) {
        self.push(ExecutionEvent::Log(entry.clone()));
    }

    fn on_error(&self, message: &str, step_id: Option<&str>) {
        self.push(ExecutionEvent::Error {
            message: message.to_string(),
            step_id: step_id.map(str::to_string),
        });
    }

    fn on_status_change(&self, status: OverallStatus) {
        self.push(ExecutionEvent::StatusChanged { status });
    }
}

/// Delivers each callback to several observers in order.
#[derive(Default, Clone)]
pub struct FanoutObserver {
    observers: Vec<Arc<dyn ExecutionObserver>>,
}

impl FanoutObserver {
    pub fn new(observers: Vec<Arc<dyn ExecutionObserver>>) -> Self {
        Self { observers }
    }

    pub fn push(&mut self, observer: Arc<dyn ExecutionObserver>) {
        self.observers.push(observer);
    }
}

impl ExecutionObserver for FanoutObserver {
    fn on_step_start(&self, step_id: &str, status: StepStatus) {
        self.observers.iter().for_each(|o| o.on_step_start(step_id, status));
    }

    fn on_step_complete(&self, step_id: &str, result: &StepExecutionResult) {
        self.observers.iter().for_each(|o| o.on_step_complete(step_id, result));
    }

    fn on_log(&self, entry: &LogEntry) {
        self.observers.iter().for_each(|o| o.on_log(entry));
    }

    fn on_error(&self, message: &str, step_id: Option<&str>) {
        self.observers.iter().for_each(|o| o.on_error(message, step_id));
    }

    fn on_status_change(&self, status: OverallStatus) {
        self.observers.iter().for_each(|o| o.on_status_change(status));
    }
}
