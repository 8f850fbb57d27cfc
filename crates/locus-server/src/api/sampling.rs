//! Sampling control endpoints.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use locus_core::SamplingStatus;

use crate::api::error::{ApiError, ApiResult, ErrorResponse};
use crate::state::SharedState;

/// Creates the sampling router with all endpoints.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", get(get_status))
        .route("/start", post(start_sampling))
        .route("/stop", post(stop_sampling))
}

/// Get sampling status.
#[utoipa::path(
    get,
    path = "/api/sampling",
    tag = "sampling",
    operation_id = "getSamplingStatus",
    summary = "Get sampling status",
    description = "Returns whether the sampling loop is running and how many \
        readings it has accepted, rejected and failed to obtain.",
    responses(
        (status = 200, description = "Sampling status", body = SamplingStatus)
    )
)]
pub async fn get_status(State(state): State<SharedState>) -> Json<SamplingStatus> {
    Json(state.service.sampling_status())
}

/// Start sampling.
#[utoipa::path(
    post,
    path = "/api/sampling/start",
    tag = "sampling",
    operation_id = "startSampling",
    summary = "Start sampling",
    description = "Starts the sampling loop. Starting a running loop has no effect. \
        Location access must be authorized first.",
    responses(
        (status = 200, description = "Sampling running", body = SamplingStatus),
        (status = 403, description = "Location access is not authorized", body = ErrorResponse),
        (status = 409, description = "Service has been disposed", body = ErrorResponse)
    )
)]
pub async fn start_sampling(State(state): State<SharedState>) -> ApiResult<Json<SamplingStatus>> {
    state.service.start()?;
    Ok(Json(state.service.sampling_status()))
}

/// Stop sampling.
#[utoipa::path(
    post,
    path = "/api/sampling/stop",
    tag = "sampling",
    operation_id = "stopSampling",
    summary = "Stop sampling",
    description = "Stops the sampling loop and saves the location history. \
        Stopping a stopped loop has no effect.",
    responses(
        (status = 200, description = "Sampling stopped", body = SamplingStatus),
        (status = 500, description = "Stopping failed", body = ErrorResponse)
    )
)]
pub async fn stop_sampling(State(state): State<SharedState>) -> ApiResult<Json<SamplingStatus>> {
    // Stopping saves the history to disk.
    let service = Arc::clone(&state.service);
    tokio::task::spawn_blocking(move || service.stop())
        .await
        .map_err(|e| ApiError::InternalError {
            error_code: "STOP_FAILED".to_string(),
            message: "Failed to stop sampling".to_string(),
            details: Some(e.to_string()),
        })?;
    Ok(Json(state.service.sampling_status()))
}
