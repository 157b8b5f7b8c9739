//! Server-Sent Events stream of run progress.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use factory::core::types::ProgressEvent;
use futures::stream::Stream;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::warn;

use crate::state::{AppState, UiEvent};

#[derive(Serialize)]
struct ProgressPayload<'a> {
    run_id: u64,
    #[serde(flatten)]
    event: &'a ProgressEvent,
}

#[derive(Serialize)]
struct CriticalPayload<'a> {
    run_id: u64,
    message: &'a str,
}

/// Map a broadcast event to its SSE event name and JSON body.
fn encode(event: &UiEvent) -> serde_json::Result<(&'static str, String)> {
    match event {
        UiEvent::Progress { run_id, event } => Ok((
            "progress",
            serde_json::to_string(&ProgressPayload {
                run_id: *run_id,
                event,
            })?,
        )),
        UiEvent::Critical { run_id, message } => Ok((
            "critical",
            serde_json::to_string(&CriticalPayload {
                run_id: *run_id,
                message,
            })?,
        )),
    }
}

/// SSE endpoint handler.
pub async fn events_handler(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut rx = state.event_tx.subscribe();

    let stream = async_stream::stream! {
        yield Ok(Event::default().event("connected").data("{}"));

        loop {
            match rx.recv().await {
                Ok(ui_event) => match encode(&ui_event) {
                    Ok((name, json)) => yield Ok(Event::default().event(name).data(json)),
                    Err(e) => warn!(error = %e, "failed to encode SSE payload"),
                },
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "SSE client lagged, some events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)).text("ping"))
}
