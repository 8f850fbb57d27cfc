//! Location history and live update endpoints.
//!
//! `GET /api/locations/stream` is a server-sent-events channel: every event
//! published by the service is forwarded as one SSE message named `location`
//! or `error`, with the JSON-encoded [`LocationEvent`] as data. The
//! subscription lives exactly as long as the HTTP connection. A client that
//! falls [`STREAM_BUFFER`] events behind misses events until it catches up.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::get;
use axum::{Json, Router};
use futures::stream::{self, Stream};
use locus_core::{Disposition, LocationEvent, LocationSample, LocationService, Subscription};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};
use utoipa::{IntoParams, ToSchema};

use crate::api::error::{ApiResult, ErrorResponse};
use crate::state::SharedState;

/// Number of samples returned when `n` is omitted.
pub const DEFAULT_LOCATION_COUNT: i64 = 1;

/// Events buffered per stream client.
pub const STREAM_BUFFER: usize = 64;

/// Creates the locations router with all endpoints.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", get(get_last_locations).post(submit_location))
        .route("/stream", get(stream_locations))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Query parameters for the history endpoint.
#[derive(Debug, Clone, Deserialize, IntoParams)]
pub struct LocationsQuery {
    /// Number of most recent samples to return. Must be greater than 0.
    /// Defaults to 1.
    #[param(example = 10)]
    pub n: Option<i64>,
}

/// Recent location history.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "count": 2,
    "locations": [
        {"latitude": 48.8584, "longitude": 2.2945, "accuracy": 12.5, "time": 1_736_912_400_000_i64},
        {"latitude": 48.8590, "longitude": 2.2950, "accuracy": 10.0, "time": 1_736_912_410_000_i64}
    ]
}))]
pub struct LocationsResponse {
    /// Number of samples returned (at most `n`).
    #[schema(example = 2)]
    pub count: usize,

    /// Samples in chronological order, oldest first.
    pub locations: Vec<LocationSample>,
}

/// Outcome of submitting a reading.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "disposition": "accepted",
    "sample": {"latitude": 48.8584, "longitude": 2.2945, "accuracy": 12.5, "time": 1_736_912_400_000_i64}
}))]
pub struct SubmitLocationResponse {
    /// What happened to the reading.
    pub disposition: Disposition,

    /// The reading as submitted.
    pub sample: LocationSample,
}

// ============================================================================
// Handlers
// ============================================================================

/// Get the most recent locations.
#[utoipa::path(
    get,
    path = "/api/locations",
    tag = "locations",
    operation_id = "getLastLocations",
    summary = "Get the most recent locations",
    description = "Returns up to `n` of the most recently accepted samples in \
        chronological order. Fewer are returned when the history is shorter.",
    params(LocationsQuery),
    responses(
        (status = 200, description = "History retrieved", body = LocationsResponse),
        (status = 400, description = "`n` is not greater than 0", body = ErrorResponse)
    )
)]
pub async fn get_last_locations(
    State(state): State<SharedState>,
    query: Result<Query<LocationsQuery>, QueryRejection>,
) -> ApiResult<Json<LocationsResponse>> {
    let Query(query) = query?;
    let locations = state
        .service
        .get_last_locations(query.n.unwrap_or(DEFAULT_LOCATION_COUNT))?;

    Ok(Json(LocationsResponse {
        count: locations.len(),
        locations,
    }))
}

/// Submit a location reading.
#[utoipa::path(
    post,
    path = "/api/locations",
    tag = "locations",
    operation_id = "submitLocation",
    summary = "Submit a location reading",
    description = "Runs an externally obtained reading through the same movement, \
        time and ordering checks as readings from the location provider. Accepted \
        readings are stored and published to subscribers.",
    request_body = LocationSample,
    responses(
        (status = 200, description = "Reading processed", body = SubmitLocationResponse),
        (status = 400, description = "Malformed reading", body = ErrorResponse),
        (status = 403, description = "Location access is not authorized", body = ErrorResponse),
        (status = 409, description = "Service has been disposed", body = ErrorResponse)
    )
)]
pub async fn submit_location(
    State(state): State<SharedState>,
    body: Result<Json<LocationSample>, JsonRejection>,
) -> ApiResult<Json<SubmitLocationResponse>> {
    let Json(sample) = body?;
    let sample = LocationSample::new(sample.latitude, sample.longitude, sample.accuracy, sample.time);
    let disposition = state.service.submit_sample(sample)?;
    Ok(Json(SubmitLocationResponse {
        disposition,
        sample,
    }))
}

/// Stream location events.
#[utoipa::path(
    get,
    path = "/api/locations/stream",
    tag = "locations",
    operation_id = "streamLocations",
    summary = "Stream location events",
    description = "Server-sent events. Each accepted sample is sent as a `location` \
        event and each provider failure as an `error` event; the data is a \
        LocationEvent `{success, payload}`. Closing the connection ends the \
        subscription.",
    responses(
        (status = 200, description = "Event stream", content_type = "text/event-stream", body = LocationEvent)
    )
)]
pub async fn stream_locations(
    State(state): State<SharedState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (tx, rx) = mpsc::channel::<LocationEvent>(STREAM_BUFFER);
    let subscription = state.service.subscribe(move |event| match tx.try_send(event.clone()) {
        Ok(()) => Ok(()),
        Err(TrySendError::Full(_)) => {
            warn!("Location stream client is not keeping up, event dropped");
            Ok(())
        }
        Err(err @ TrySendError::Closed(_)) => Err(err.into()),
    });
    let guard = StreamGuard::new(Arc::clone(&state.service), subscription);
    debug!("Location stream opened");

    let events = stream::unfold((rx, guard), |(mut rx, guard)| async move {
        let event = rx.recv().await?;
        Some((Ok(to_sse(&event)), (rx, guard)))
    });

    Sse::new(events).keep_alive(KeepAlive::default())
}

fn to_sse(event: &LocationEvent) -> Event {
    let name = if event.success { "location" } else { "error" };
    match Event::default().event(name).json_data(event) {
        Ok(sse) => sse,
        Err(e) => {
            warn!(error = %e, "Failed to encode location event");
            Event::default().comment("encoding failed")
        }
    }
}

/// Unsubscribes when the SSE stream is dropped.
struct StreamGuard {
    service: Arc<LocationService>,
    subscription: Subscription,
}

impl StreamGuard {
    const fn new(service: Arc<LocationService>, subscription: Subscription) -> Self {
        Self {
            service,
            subscription,
        }
    }
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.service.unsubscribe(&self.subscription);
        debug!(subscription = %self.subscription.id(), "Location stream closed");
    }
}
