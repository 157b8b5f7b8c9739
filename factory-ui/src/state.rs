//! Shared application state for the UI server.

use std::sync::{Arc, Mutex, MutexGuard};

use factory::core::cancel::CancelToken;
use factory::core::types::{ProgressEvent, WorkflowOutcome};
use factory::io::backend::ModelBackend;
use factory::io::config::FactoryConfig;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::warn;

/// Builds a fresh model backend for each run, on the worker thread.
pub type BackendFactory =
    Arc<dyn Fn() -> anyhow::Result<Box<dyn ModelBackend + Send>> + Send + Sync>;

/// Events broadcast to SSE clients while a run is in progress.
#[derive(Debug, Clone)]
pub enum UiEvent {
    Progress { run_id: u64, event: ProgressEvent },
    /// The run faulted outside the workflow's own error handling.
    Critical { run_id: u64, message: String },
}

/// Everything the UI needs to redraw the latest run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSnapshot {
    pub run_id: u64,
    pub request: String,
    pub max_iterations: u32,
    pub running: bool,
    pub events: Vec<ProgressEvent>,
    pub outcome: Option<WorkflowOutcome>,
    pub critical: Option<String>,
}

/// Why a run could not be started or aborted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunConflict {
    AlreadyRunning,
    NotRunning,
}

#[derive(Default)]
struct RunSlot {
    next_id: u64,
    /// Cancel handle of the active run, if any. At most one run is active.
    active: Option<(u64, CancelToken)>,
    last: Option<RunSnapshot>,
}

/// Shared state accessible from all request handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<FactoryConfig>,
    /// Whether a real API key was found at startup.
    pub key_configured: bool,
    pub backend_factory: BackendFactory,
    /// Broadcast sender for run events.
    pub event_tx: Arc<broadcast::Sender<UiEvent>>,
    runs: Arc<Mutex<RunSlot>>,
}

impl AppState {
    pub fn new(config: FactoryConfig, key_configured: bool, backend_factory: BackendFactory) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self {
            config: Arc::new(config),
            key_configured,
            backend_factory,
            event_tx: Arc::new(event_tx),
            runs: Arc::new(Mutex::new(RunSlot::default())),
        }
    }

    fn slot(&self) -> MutexGuard<'_, RunSlot> {
        // A poisoned lock only means a handler panicked mid-update; the slot is still usable.
        self.runs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn is_running(&self) -> bool {
        self.slot().active.is_some()
    }

    /// Reserve the single run slot. Returns the new run id and its cancel token.
    pub fn begin_run(
        &self,
        request: &str,
        max_iterations: u32,
    ) -> Result<(u64, CancelToken), RunConflict> {
        let mut slot = self.slot();
        if slot.active.is_some() {
            return Err(RunConflict::AlreadyRunning);
        }
        slot.next_id += 1;
        let run_id = slot.next_id;
        let cancel = CancelToken::new();
        slot.active = Some((run_id, cancel.clone()));
        slot.last = Some(RunSnapshot {
            run_id,
            request: request.to_string(),
            max_iterations,
            running: true,
            events: Vec::new(),
            outcome: None,
            critical: None,
        });
        Ok((run_id, cancel))
    }

    /// Ask the active run to stop at its next iteration boundary.
    pub fn abort_run(&self) -> Result<u64, RunConflict> {
        let slot = self.slot();
        let (run_id, cancel) = slot.active.as_ref().ok_or(RunConflict::NotRunning)?;
        cancel.cancel();
        Ok(*run_id)
    }

    /// Record a progress event and fan it out to SSE subscribers.
    ///
    /// The final `Finished` event is held back and broadcast by [`finish_run`]
    /// once the slot is free, so a client reacting to it can start the next run.
    ///
    /// [`finish_run`]: AppState::finish_run
    pub fn record_event(&self, run_id: u64, event: &ProgressEvent) {
        if let Some(snapshot) = self.slot().last.as_mut().filter(|s| s.run_id == run_id) {
            snapshot.events.push(event.clone());
        }
        if matches!(event, ProgressEvent::Finished { .. }) {
            return;
        }
        // No subscribers is fine; the snapshot keeps the history.
        let _ = self.event_tx.send(UiEvent::Progress {
            run_id,
            event: event.clone(),
        });
    }

    /// Release the run slot with the run's result, then announce the end.
    pub fn finish_run(&self, run_id: u64, result: anyhow::Result<WorkflowOutcome>) {
        let closing = {
            let mut slot = self.slot();
            if slot.active.as_ref().is_some_and(|(id, _)| *id == run_id) {
                slot.active = None;
            }
            let snapshot = slot.last.as_mut().filter(|s| s.run_id == run_id);
            match (snapshot, result) {
                (Some(snapshot), Ok(outcome)) => {
                    snapshot.running = false;
                    snapshot.outcome = Some(outcome);
                    snapshot
                        .events
                        .last()
                        .filter(|e| matches!(e, ProgressEvent::Finished { .. }))
                        .map(|event| UiEvent::Progress {
                            run_id,
                            event: event.clone(),
                        })
                }
                (Some(snapshot), Err(err)) => {
                    let message = format!("{err:#}");
                    snapshot.running = false;
                    snapshot.critical = Some(message.clone());
                    Some(UiEvent::Critical { run_id, message })
                }
                (None, Ok(_)) => None,
                (None, Err(err)) => Some(UiEvent::Critical {
                    run_id,
                    message: format!("{err:#}"),
                }),
            }
        };

        if let Some(event) = closing {
            if let UiEvent::Critical { message, .. } = &event {
                warn!(run_id, error = %message, "workflow run faulted");
            }
            let _ = self.event_tx.send(event);
        }
    }

    pub fn current_run(&self) -> Option<RunSnapshot> {
        self.slot().last.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use factory::core::language::Language;
    use factory::core::types::FinishReason;
    use factory::test_support::ScriptedBackend;

    fn test_state() -> AppState {
        let factory: BackendFactory = Arc::new(|| {
            Ok(Box::new(ScriptedBackend::new(Vec::new())) as Box<dyn ModelBackend + Send>)
        });
        AppState::new(FactoryConfig::default(), false, factory)
    }

    fn outcome() -> WorkflowOutcome {
        WorkflowOutcome {
            success: true,
            reason: FinishReason::Approved,
            artifact: "x = 1".to_string(),
            language: Language::Python,
            iterations_run: 1,
            history: Vec::new(),
        }
    }

    #[test]
    fn only_one_run_at_a_time() {
        let state = test_state();
        let (run_id, _) = state.begin_run("calc", 5).expect("begin");
        assert_eq!(
            state.begin_run("outro", 5).unwrap_err(),
            RunConflict::AlreadyRunning
        );
        state.finish_run(run_id, Ok(outcome()));
        assert!(!state.is_running());
        let (next_id, _) = state.begin_run("outro", 5).expect("begin again");
        assert_eq!(next_id, run_id + 1);
    }

    #[test]
    fn abort_sets_cancel_token() {
        let state = test_state();
        assert_eq!(state.abort_run().unwrap_err(), RunConflict::NotRunning);
        let (run_id, cancel) = state.begin_run("calc", 5).expect("begin");
        assert_eq!(state.abort_run().expect("abort"), run_id);
        assert!(cancel.is_cancelled());
    }

    #[test]
    fn events_accumulate_in_snapshot_and_broadcast() {
        let state = test_state();
        let mut rx = state.event_tx.subscribe();
        let (run_id, _) = state.begin_run("calc", 5).expect("begin");
        let event = ProgressEvent::Started {
            message: "m".to_string(),
        };
        state.record_event(run_id, &event);

        let snapshot = state.current_run().expect("snapshot");
        assert_eq!(snapshot.events, vec![event]);
        assert!(snapshot.running);
        assert!(matches!(
            rx.try_recv(),
            Ok(UiEvent::Progress { run_id: id, .. }) if id == run_id
        ));
    }

    #[test]
    fn failed_run_broadcasts_critical_and_resets() {
        let state = test_state();
        let mut rx = state.event_tx.subscribe();
        let (run_id, _) = state.begin_run("calc", 5).expect("begin");

        state.finish_run(run_id, Err(anyhow!("worker panicked")));

        assert!(!state.is_running());
        let snapshot = state.current_run().expect("snapshot");
        assert!(!snapshot.running);
        assert_eq!(snapshot.critical.as_deref(), Some("worker panicked"));
        assert!(matches!(
            rx.try_recv(),
            Ok(UiEvent::Critical { message, .. }) if message == "worker panicked"
        ));
    }

    #[test]
    fn finished_event_is_sent_after_slot_release() {
        let state = test_state();
        let mut rx = state.event_tx.subscribe();
        let (run_id, _) = state.begin_run("calc", 5).expect("begin");
        let finished = ProgressEvent::Finished {
            success: true,
            reason: FinishReason::Approved,
            artifact: "x = 1".to_string(),
            language: Language::Python,
            message: None,
        };

        state.record_event(run_id, &finished);
        assert!(rx.try_recv().is_err());
        assert!(state.is_running());

        state.finish_run(run_id, Ok(outcome()));
        assert!(matches!(
            rx.try_recv(),
            Ok(UiEvent::Progress { event: ProgressEvent::Finished { .. }, .. })
        ));
        assert!(!state.is_running());
        assert!(state.begin_run("outro", 5).is_ok());
    }
}
