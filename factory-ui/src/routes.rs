//! HTTP route handlers for the UI API.

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{Html, Json};
use axum::routing::{get, post};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::runs::spawn_run;
use crate::state::{AppState, RunConflict, RunSnapshot};

const INDEX_HTML: &str = include_str!("../static/index.html");

type ApiError = (StatusCode, Json<ErrorBody>);

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    error: String,
}

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
}

/// Build the API router.
pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(get_status))
        .route("/runs", post(start_run))
        .route("/runs/abort", post(abort_run))
        .route("/runs/current", get(get_current_run))
}

/// GET / - embedded single-page UI.
pub async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn health() -> &'static str {
    "ok"
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    key_configured: bool,
    running: bool,
    model: String,
    iterations: IterationsInfo,
}

#[derive(Debug, Serialize)]
struct IterationsInfo {
    min: u32,
    max: u32,
    default: u32,
}

/// GET /api/status - key presence, run flag and slider bounds.
async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let bounds = state.config.iterations;
    Json(StatusResponse {
        key_configured: state.key_configured,
        running: state.is_running(),
        model: state.config.model.clone(),
        iterations: IterationsInfo {
            min: bounds.min,
            max: bounds.max,
            default: bounds.default,
        },
    })
}

#[derive(Debug, Deserialize)]
struct StartRequest {
    request: String,
    max_iterations: Option<u32>,
}

#[derive(Debug, Serialize)]
struct StartResponse {
    run_id: u64,
}

/// POST /api/runs - start a workflow run.
async fn start_run(
    State(state): State<AppState>,
    Json(body): Json<StartRequest>,
) -> Result<(StatusCode, Json<StartResponse>), ApiError> {
    let max_iterations = validate_start(&state, &body)?;
    let (run_id, cancel) = state
        .begin_run(&body.request, max_iterations)
        .map_err(conflict_error)?;
    info!(run_id, max_iterations, "run accepted");
    spawn_run(state, run_id, body.request, max_iterations, cancel);
    Ok((StatusCode::ACCEPTED, Json(StartResponse { run_id })))
}

fn validate_start(state: &AppState, body: &StartRequest) -> Result<u32, ApiError> {
    if body.request.trim().is_empty() {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "Por favor, insira um pedido válido para iniciar.",
        ));
    }
    let bounds = state.config.iterations;
    let max_iterations = body.max_iterations.unwrap_or(bounds.default);
    if !bounds.contains(max_iterations) {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            format!(
                "max_iterations must be within [{}, {}]",
                bounds.min, bounds.max
            ),
        ));
    }
    Ok(max_iterations)
}

/// POST /api/runs/abort - request cooperative cancellation.
async fn abort_run(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    let run_id = state.abort_run().map_err(conflict_error)?;
    info!(run_id, "abort requested");
    Ok(StatusCode::ACCEPTED)
}

/// GET /api/runs/current - snapshot of the latest run.
async fn get_current_run(State(state): State<AppState>) -> Result<Json<RunSnapshot>, StatusCode> {
    state.current_run().map(Json).ok_or(StatusCode::NOT_FOUND)
}

fn conflict_error(conflict: RunConflict) -> ApiError {
    match conflict {
        RunConflict::AlreadyRunning => api_error(StatusCode::CONFLICT, "a run is already in progress"),
        RunConflict::NotRunning => api_error(StatusCode::CONFLICT, "no run in progress"),
    }
}
