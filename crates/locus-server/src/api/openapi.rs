//! OpenAPI specification generation for the locus API.
//!
//! The document is served at `/api/openapi.json` and written to disk by the
//! `gen-openapi` binary for client generation.

use axum::Json;
use locus_core::{
    AuthorizationState, DesiredAccuracy, Disposition, ErrorInfo, EventPayload, LocationConfiguration,
    LocationEvent, LocationSample, PartialLocationConfiguration, SamplingStatus,
};
use utoipa::OpenApi;

use super::authorization::AuthorizationResponse;
use super::config::{ConfigResponse, RevertTemporaryResponse};
use super::error::ErrorResponse;
use super::health::HealthResponse;
use super::locations::{LocationsResponse, SubmitLocationResponse};

/// Serve the OpenAPI specification as JSON.
pub async fn get_openapi_spec() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Returns the OpenAPI specification as a pretty-printed string.
///
/// # Errors
///
/// Returns an error if the document cannot be serialized.
pub fn get_openapi_json() -> serde_json::Result<String> {
    ApiDoc::openapi().to_pretty_json()
}

/// Main OpenAPI document structure for locus.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "locus API",
        version = "0.1.0",
        description = r#"
# locus API

locus samples the device location, keeps a short history of accepted fixes,
and pushes every accepted fix to subscribers.

## Overview

1. **Configuration**: a base configuration plus an optional temporary override
   (for example high accuracy for a minute). The override is merged over the
   base, never over a previous override.
2. **Sampling**: a reading is accepted when it moved at least
   `distance_filter_meters` or arrived at least `update_interval_ms` after the
   last accepted one.
3. **History**: the most recent accepted samples, oldest first.
4. **Live updates**: `GET /api/locations/stream` sends every event as
   server-sent events shaped `{success, payload}`.
5. **Authorization**: sampling requires the `authorized` state.
"#,
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers(
        (url = "/", description = "Local locus server")
    ),
    tags(
        (name = "system", description = "Health checks"),
        (name = "config", description = "Base and temporary location configuration"),
        (name = "locations", description = "Location history, submission and live updates"),
        (name = "authorization", description = "Location access authorization"),
        (name = "sampling", description = "Sampling loop control and counters")
    ),
    paths(
        // Health endpoints
        super::health::health_check,
        // Config endpoints
        super::config::get_config,
        super::config::configure,
        super::config::set_temporary_configuration,
        super::config::revert_temporary_configuration,
        // Location endpoints
        super::locations::get_last_locations,
        super::locations::submit_location,
        super::locations::stream_locations,
        // Authorization endpoints
        super::authorization::check_authorization,
        super::authorization::request_authorization,
        super::authorization::revoke_authorization,
        // Sampling endpoints
        super::sampling::get_status,
        super::sampling::start_sampling,
        super::sampling::stop_sampling,
    ),
    components(
        schemas(
            // Error types
            ErrorResponse,
            ErrorInfo,
            // Health types
            HealthResponse,
            // Config types
            DesiredAccuracy,
            LocationConfiguration,
            PartialLocationConfiguration,
            ConfigResponse,
            RevertTemporaryResponse,
            // Location types
            LocationSample,
            LocationEvent,
            EventPayload,
            LocationsResponse,
            Disposition,
            SubmitLocationResponse,
            // Authorization types
            AuthorizationState,
            AuthorizationResponse,
            // Sampling types
            SamplingStatus,
        )
    )
)]
pub struct ApiDoc;
