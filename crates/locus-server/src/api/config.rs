//! Configuration API endpoints.
//!
//! The base configuration persists until changed; the temporary override
//! replaces it until reverted. Both accept partial updates.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::routing::{get, put};
use axum::{Json, Router};
use locus_core::{ConfigurationSnapshot, LocationConfiguration, PartialLocationConfiguration};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::api::error::{ApiResult, ErrorResponse};
use crate::state::SharedState;

/// Creates the config router with all endpoints.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", get(get_config).put(configure))
        .route(
            "/temporary",
            put(set_temporary_configuration).delete(revert_temporary_configuration),
        )
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Current configuration response.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "base": {
        "desired_accuracy": "HundredMeters",
        "distance_filter_meters": 100.0,
        "update_interval_ms": 10000,
        "poll_interval_ms": 1000
    },
    "temporary": {
        "desired_accuracy": "BestForNavigation",
        "distance_filter_meters": 100.0,
        "update_interval_ms": 10000,
        "poll_interval_ms": 1000
    },
    "effective": {
        "desired_accuracy": "BestForNavigation",
        "distance_filter_meters": 100.0,
        "update_interval_ms": 10000,
        "poll_interval_ms": 1000
    }
}))]
pub struct ConfigResponse {
    /// The persistent configuration.
    pub base: LocationConfiguration,

    /// The temporary override, if installed.
    #[schema(nullable)]
    pub temporary: Option<LocationConfiguration>,

    /// The configuration the next sampling cycle uses.
    pub effective: LocationConfiguration,
}

impl From<ConfigurationSnapshot> for ConfigResponse {
    fn from(snapshot: ConfigurationSnapshot) -> Self {
        let effective = snapshot.effective().clone();
        Self {
            base: snapshot.base,
            temporary: snapshot.temporary,
            effective,
        }
    }
}

/// Response after reverting the temporary configuration.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RevertTemporaryResponse {
    /// Whether an override was installed before the call.
    #[schema(example = true)]
    pub reverted: bool,

    /// Configuration after the revert.
    pub config: ConfigResponse,
}

// ============================================================================
// Handlers
// ============================================================================

/// Get current configuration.
#[utoipa::path(
    get,
    path = "/api/config",
    tag = "config",
    operation_id = "getConfig",
    summary = "Get current configuration",
    description = "Returns the base configuration, the temporary override if one \
        is installed, and the effective configuration.",
    responses(
        (status = 200, description = "Configuration retrieved", body = ConfigResponse)
    )
)]
pub async fn get_config(State(state): State<SharedState>) -> Json<ConfigResponse> {
    Json(state.service.configuration_snapshot().into())
}

/// Update the base configuration.
#[utoipa::path(
    put,
    path = "/api/config",
    tag = "config",
    operation_id = "configure",
    summary = "Update the base configuration",
    description = "Merges the supplied fields over the base configuration. Omitted \
        fields keep their current value. A temporary override stays in force.",
    request_body = PartialLocationConfiguration,
    responses(
        (status = 200, description = "Base configuration updated", body = ConfigResponse),
        (status = 400, description = "A field is out of range", body = ErrorResponse)
    )
)]
pub async fn configure(
    State(state): State<SharedState>,
    body: Result<Json<PartialLocationConfiguration>, JsonRejection>,
) -> ApiResult<Json<ConfigResponse>> {
    let Json(partial) = body?;
    state.service.configure(&partial)?;
    Ok(Json(state.service.configuration_snapshot().into()))
}

/// Install a temporary configuration.
#[utoipa::path(
    put,
    path = "/api/config/temporary",
    tag = "config",
    operation_id = "setTemporaryConfiguration",
    summary = "Install a temporary configuration",
    description = "Merges the supplied fields over the base configuration (not over \
        a previous override) and installs the result as the temporary override.",
    request_body = PartialLocationConfiguration,
    responses(
        (status = 200, description = "Temporary configuration installed", body = ConfigResponse),
        (status = 400, description = "A field is out of range", body = ErrorResponse)
    )
)]
pub async fn set_temporary_configuration(
    State(state): State<SharedState>,
    body: Result<Json<PartialLocationConfiguration>, JsonRejection>,
) -> ApiResult<Json<ConfigResponse>> {
    let Json(partial) = body?;
    state.service.set_temporary_configuration(&partial)?;
    Ok(Json(state.service.configuration_snapshot().into()))
}

/// Revert the temporary configuration.
#[utoipa::path(
    delete,
    path = "/api/config/temporary",
    tag = "config",
    operation_id = "revertTemporaryConfiguration",
    summary = "Revert the temporary configuration",
    description = "Removes the temporary override so the base configuration applies \
        again. Succeeds when no override is installed.",
    responses(
        (status = 200, description = "Temporary configuration reverted", body = RevertTemporaryResponse)
    )
)]
pub async fn revert_temporary_configuration(
    State(state): State<SharedState>,
) -> Json<RevertTemporaryResponse> {
    let reverted = state.service.revert_temporary_configuration();
    Json(RevertTemporaryResponse {
        reverted,
        config: state.service.configuration_snapshot().into(),
    })
}
