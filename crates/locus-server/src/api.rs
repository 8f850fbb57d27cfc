//! HTTP API routes and handlers.
//!
//! This module contains all HTTP endpoint implementations organized by domain:
//! - `authorization` - Location authorization state and consent
//! - `config` - Base and temporary location configuration
//! - `health` - Service health checks
//! - `locations` - Location history, sample submission and the live stream
//! - `sampling` - Sampling loop control and counters
//! - `error` - API error types
//! - `openapi` - OpenAPI specification generation

use axum::routing::get;
use axum::Router;
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::SharedState;

pub mod authorization;
pub mod config;
pub mod error;
pub mod health;
pub mod locations;
pub mod openapi;
pub mod sampling;

pub use error::{ApiError, ApiResult, ErrorResponse};
pub use openapi::get_openapi_json;

/// Creates the combined API router with all endpoints.
///
/// # Route Structure
///
/// ```text
/// /health                  - Health check
/// /api
/// ├── /config              - Base and temporary configuration
/// ├── /locations           - History, submission and SSE stream
/// ├── /authorization       - Authorization state and consent
/// ├── /sampling            - Start, stop and status
/// └── /openapi.json        - OpenAPI specification
/// ```
pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .nest("/health", health::router())
        .nest(
            "/api",
            Router::new()
                .route("/openapi.json", get(openapi::get_openapi_spec))
                .nest("/config", config::router())
                .nest("/locations", locations::router())
                .nest("/authorization", authorization::router())
                .nest("/sampling", sampling::router()),
        )
        .fallback(error::not_found)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CompressionLayer::new())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}
