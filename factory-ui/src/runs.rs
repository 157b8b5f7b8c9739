//! Workflow execution on a blocking worker thread.

use anyhow::anyhow;
use factory::core::cancel::CancelToken;
use factory::core::persona::PersonaRegistry;
use factory::core::protocol::extract_reference_code;
use factory::core::types::WorkflowOutcome;
use factory::io::invoker::PersonaInvoker;
use factory::workflow::{WorkflowRequest, run_workflow};
use tracing::{info, instrument};

use crate::state::AppState;

/// Run the workflow for `run_id` in the background.
///
/// The synchronous run goes to `spawn_blocking`; a supervising task releases
/// the run slot when it ends, including when the worker panics.
pub fn spawn_run(state: AppState, run_id: u64, raw_request: String, max_iterations: u32, cancel: CancelToken) {
    tokio::spawn(async move {
        let worker_state = state.clone();
        let joined = tokio::task::spawn_blocking(move || {
            execute_run(&worker_state, run_id, &raw_request, max_iterations, &cancel)
        })
        .await;
        let result = joined.unwrap_or_else(|err| Err(anyhow!("workflow worker failed: {err}")));
        state.finish_run(run_id, result);
    });
}

#[instrument(skip_all, fields(run_id = run_id, max_iterations = max_iterations))]
fn execute_run(
    state: &AppState,
    run_id: u64,
    raw_request: &str,
    max_iterations: u32,
    cancel: &CancelToken,
) -> anyhow::Result<WorkflowOutcome> {
    let request = WorkflowRequest {
        client_request: extract_reference_code(raw_request),
        max_iterations,
        reference_policy: state.config.reference_policy,
    };
    info!(has_reference = request.client_request.has_reference(), "run started");

    let backend = (state.backend_factory)()?;
    let invoker = PersonaInvoker::new(backend);
    let registry = PersonaRegistry::with_model(&state.config.model);

    let outcome = run_workflow(&invoker, &registry, &request, cancel, |event| {
        state.record_event(run_id, event);
    })?;
    info!(success = outcome.success, reason = ?outcome.reason, "run finished");
    Ok(outcome)
}
