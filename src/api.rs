// src/api.rs
use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::error;

use crate::coordinator::{RunCoordinator, SchedulerStatus};
use crate::error::{ExtractError, TriggerError};
use crate::extract::{Extractor, Metadata};
use crate::history::RunLog;

#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<RunCoordinator>,
    pub extractor: Arc<Extractor>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/aggregation/status", get(status))
        .route("/aggregation/logs", get(logs))
        .route("/aggregation/logs/latest", get(latest_log))
        .route("/aggregation/trigger", post(trigger))
        .route("/extract", post(extract))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

#[derive(Debug)]
pub enum ApiError {
    Trigger(TriggerError),
    Extract(ExtractError),
    Internal(String),
}

impl From<TriggerError> for ApiError {
    fn from(e: TriggerError) -> Self {
        ApiError::Trigger(e)
    }
}

impl From<ExtractError> for ApiError {
    fn from(e: ExtractError) -> Self {
        ApiError::Extract(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, message) = match self {
            ApiError::Trigger(e @ TriggerError::AlreadyRunning) => {
                (StatusCode::CONFLICT, "already_running", e.to_string())
            }
            ApiError::Extract(e @ ExtractError::InvalidInput(_)) => {
                (StatusCode::BAD_REQUEST, "invalid_input", e.to_string())
            }
            ApiError::Internal(m) => (StatusCode::INTERNAL_SERVER_ERROR, "internal", m),
        };
        (status, Json(ErrorBody { error, message })).into_response()
    }
}

async fn status(State(state): State<AppState>) -> Json<SchedulerStatus> {
    Json(state.coordinator.status())
}

async fn logs(State(state): State<AppState>) -> Json<Vec<RunLog>> {
    Json(state.coordinator.logs())
}

async fn latest_log(State(state): State<AppState>) -> Json<Option<RunLog>> {
    Json(state.coordinator.latest_log())
}

/// Synchronous trigger: answers with the finished run's log. The run itself
/// is spawned so a client hanging up does not cancel it halfway.
async fn trigger(State(state): State<AppState>) -> Result<Json<RunLog>, ApiError> {
    let coordinator = state.coordinator.clone();
    let handle = tokio::spawn(async move { coordinator.trigger_run(true).await });
    match handle.await {
        Ok(res) => Ok(Json(res?)),
        Err(e) => {
            error!(target: "aggregation", error = %e, "run task failed");
            Err(ApiError::Internal("run task failed".into()))
        }
    }
}

#[derive(Debug, Deserialize)]
struct ExtractReq {
    url: String,
}

async fn extract(
    State(state): State<AppState>,
    Json(body): Json<ExtractReq>,
) -> Result<Json<Metadata>, ApiError> {
    Ok(Json(state.extractor.extract(&body.url).await?))
}
