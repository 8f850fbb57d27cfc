//! Location authorization endpoints.

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use locus_core::AuthorizationState;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::state::SharedState;

/// Creates the authorization router with all endpoints.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", get(check_authorization))
        .route("/request", post(request_authorization))
        .route("/revoke", post(revoke_authorization))
}

/// Authorization state response.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "state": "authorized",
    "can_sample": true
}))]
pub struct AuthorizationResponse {
    /// Current authorization state.
    pub state: AuthorizationState,

    /// Whether sampling may be started.
    #[schema(example = true)]
    pub can_sample: bool,
}

impl From<AuthorizationState> for AuthorizationResponse {
    fn from(state: AuthorizationState) -> Self {
        Self {
            state,
            can_sample: state.is_authorized(),
        }
    }
}

/// Get the authorization state.
#[utoipa::path(
    get,
    path = "/api/authorization",
    tag = "authorization",
    operation_id = "checkAuthorization",
    summary = "Get the authorization state",
    description = "Returns the current location authorization state without \
        prompting for consent.",
    responses(
        (status = 200, description = "Authorization state", body = AuthorizationResponse)
    )
)]
pub async fn check_authorization(State(state): State<SharedState>) -> Json<AuthorizationResponse> {
    Json(state.service.check_authorization().into())
}

/// Request authorization.
#[utoipa::path(
    post,
    path = "/api/authorization/request",
    tag = "authorization",
    operation_id = "requestAuthorization",
    summary = "Request location authorization",
    description = "Runs the consent flow when the state is `notDetermined` and \
        returns the result. Once the state is settled, returns it without \
        prompting again.",
    responses(
        (status = 200, description = "Resulting authorization state", body = AuthorizationResponse)
    )
)]
pub async fn request_authorization(
    State(state): State<SharedState>,
) -> Json<AuthorizationResponse> {
    Json(state.service.request_authorization().await.into())
}

/// Revoke authorization.
#[utoipa::path(
    post,
    path = "/api/authorization/revoke",
    tag = "authorization",
    operation_id = "revokeAuthorization",
    summary = "Revoke location authorization",
    description = "Records that location access was withdrawn. The state becomes \
        `denied` and a running sampling loop stops.",
    responses(
        (status = 200, description = "Authorization revoked", body = AuthorizationResponse)
    )
)]
pub async fn revoke_authorization(State(state): State<SharedState>) -> Json<AuthorizationResponse> {
    state.service.revoke_authorization();
    Json(state.service.check_authorization().into())
}
