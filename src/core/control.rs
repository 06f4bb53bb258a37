//! Pause/resume/stop signalling between a host and a running engine.
//!
//! The state lives in a watch channel so the engine can wait for a change
//! instead of polling; stop also cancels a token that in-flight waits select
//! on.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::{ScenarioError, ScenarioResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlState {
    Running,
    Paused,
    /// Stop requested; the engine has not unwound yet.
    Stopped,
    Completed,
    Failed,
    Cancelled,
}

impl ControlState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ControlState::Completed | ControlState::Failed | ControlState::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ControlState::Running => "running",
            ControlState::Paused => "paused",
            ControlState::Stopped => "stopped",
            ControlState::Completed => "completed",
            ControlState::Failed => "failed",
            ControlState::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ControlState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cloneable handle onto one run's control state.
#[derive(Clone)]
pub struct ExecutionControl {
    state: Arc<watch::Sender<ControlState>>,
    cancel: CancellationToken,
}

impl Default for ExecutionControl {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ExecutionControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionControl")
            .field("state", &self.state())
            .finish()
    }
}

impl ExecutionControl {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ControlState::Running);
        Self {
            state: Arc::new(tx),
            cancel: CancellationToken::new(),
        }
    }

    pub fn state(&self) -> ControlState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ControlState> {
        self.state.subscribe()
    }

    /// Request a pause at the next step boundary. Pausing twice is a no-op.
    pub fn pause(&self) -> ScenarioResult<()> {
        self.transition("pause", |s| match s {
            ControlState::Running | ControlState::Paused => Some(ControlState::Paused),
            _ => None,
        })?;
        info!("Execution pause requested");
        Ok(())
    }

    /// Continue from the current step. Resuming a running execution is a no-op.
    pub fn resume(&self) -> ScenarioResult<()> {
        self.transition("resume", |s| match s {
            ControlState::Running | ControlState::Paused => Some(ControlState::Running),
            _ => None,
        })?;
        info!("Execution resume requested");
        Ok(())
    }

    /// Stop at the next boundary and report `cancelled`.
    pub fn stop(&self) -> ScenarioResult<()> {
        self.transition("stop", |s| match s {
            ControlState::Running | ControlState::Paused | ControlState::Stopped => {
                Some(ControlState::Stopped)
            }
            _ => None,
        })?;
        self.cancel.cancel();
        info!("Execution stop requested");
        Ok(())
    }

    pub fn is_paused(&self) -> bool {
        self.state() == ControlState::Paused
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
            || matches!(self.state(), ControlState::Stopped | ControlState::Cancelled)
    }

    /// Resolves once `stop()` has been called.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    /// Enter `paused` on the engine's behalf (manual steps).
    pub(crate) fn suspend(&self) {
        self.state.send_if_modified(|s| {
            if *s == ControlState::Running {
                *s = ControlState::Paused;
                true
            } else {
                false
            }
        });
    }

    /// Record the terminal state of the run.
    pub(crate) fn finish(&self, terminal: ControlState) {
        self.state.send_replace(terminal);
    }

    /// Wait until the state is `running`. Returns `false` when the run was
    /// stopped instead.
    pub(crate) async fn wait_until_runnable(&self) -> bool {
        let mut rx = self.state.subscribe();
        loop {
            let state = *rx.borrow_and_update();
            match state {
                ControlState::Running => return true,
                ControlState::Paused => {}
                _ => return false,
            }
            tokio::select! {
                changed = rx.changed() => {
                    if changed.is_err() {
                        return false;
                    }
                }
                _ = self.cancel.cancelled() => return false,
            }
        }
    }

    fn transition<F>(&self, action: &str, next: F) -> ScenarioResult<()>
    where
        F: Fn(ControlState) -> Option<ControlState>,
    {
        let mut rejected_from = None;
        self.state.send_if_modified(|s| match next(*s) {
            Some(target) => {
                let changed = *s != target;
                *s = target;
                changed
            }
            None => {
                rejected_from = Some(*s);
                false
            }
        });
        match rejected_from {
            Some(from) => Err(ScenarioError::InvalidControlTransition {
                from: from.to_string(),
                action: action.to_string(),
            }),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_pause_resume_stop_transitions() {
        let control = ExecutionControl::new();
        assert_eq!(control.state(), ControlState::Running);
        control.pause().unwrap();
        assert!(control.is_paused());
        control.pause().unwrap();
        control.resume().unwrap();
        assert!(!control.is_paused());
        control.stop().unwrap();
        assert!(control.is_stopped());
        let err = control.resume().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid control transition: cannot resume while stopped"
        );
    }

    #[test]
    fn test_terminal_state_rejects_commands() {
        let control = ExecutionControl::new();
        control.finish(ControlState::Completed);
        assert!(control.state().is_terminal());
        assert!(control.pause().is_err());
        assert!(control.stop().is_err());
    }

    #[tokio::test]
    async fn test_wait_until_runnable_resumes() {
        let control = ExecutionControl::new();
        control.pause().unwrap();
        let waiter = {
            let control = control.clone();
            tokio::spawn(async move { control.wait_until_runnable().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());
        control.resume().unwrap();
        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn test_wait_until_runnable_stopped() {
        let control = ExecutionControl::new();
        control.suspend();
        assert!(control.is_paused());
        let waiter = {
            let control = control.clone();
            tokio::spawn(async move { control.wait_until_runnable().await })
        };
        control.stop().unwrap();
        assert!(!waiter.await.unwrap());
    }
}
