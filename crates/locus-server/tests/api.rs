//! End-to-end tests of the HTTP API.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum_test::TestServer;
use futures::StreamExt;
use locus_core::{
    AuthorizationState, LocationSample, LocationService, ScriptedProvider, ScriptedReading,
    Settings, StaticConsent,
};
use locus_server::api::config::{ConfigResponse, RevertTemporaryResponse};
use locus_server::api::create_router;
use locus_server::api::error::ErrorResponse;
use locus_server::api::locations::{LocationsResponse, SubmitLocationResponse, STREAM_BUFFER};
use locus_server::state::{AppState, SharedState};
use serde_json::json;
use tower::ServiceExt;

fn state_with(initial: AuthorizationState, script: Vec<ScriptedReading>) -> SharedState {
    let mut settings = Settings::default();
    settings.history.persist = false;
    settings.authorization.initial = initial;
    settings.location.poll_interval_ms = Some(5);

    let service = LocationService::create(
        &settings,
        Arc::new(ScriptedProvider::new(script)),
        Arc::new(StaticConsent(AuthorizationState::Authorized)),
    )
    .unwrap();

    AppState::new(service, settings)
}

fn server_with(initial: AuthorizationState, script: Vec<ScriptedReading>) -> TestServer {
    TestServer::new(create_router(state_with(initial, script))).unwrap()
}

fn server(initial: AuthorizationState) -> TestServer {
    server_with(initial, Vec::new())
}

// 0.01 degree of latitude per millisecond step, far beyond the distance filter.
#[allow(clippy::cast_precision_loss)]
fn sample(time: i64) -> serde_json::Value {
    json!({
        "latitude": time as f64 / 100.0,
        "longitude": 0.0,
        "accuracy": 5.0,
        "time": time
    })
}

#[tokio::test]
async fn test_health_check() {
    let server = server(AuthorizationState::NotDetermined);
    let response = server.get("/health").await;
    response.assert_status_ok();

    let body: serde_json::Value = response.json();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["sampling"], false);
    assert_eq!(body["authorization"], "notDetermined");
}

#[tokio::test]
async fn test_configuration_override_and_revert() {
    let server = server(AuthorizationState::Authorized);

    let response = server
        .put("/api/config")
        .json(&json!({ "distance_filter_meters": 25.0 }))
        .await;
    response.assert_status_ok();
    let config: ConfigResponse = response.json();
    assert!((config.effective.distance_filter_meters - 25.0).abs() < f64::EPSILON);
    assert!(config.temporary.is_none());

    let response = server
        .put("/api/config/temporary")
        .json(&json!({ "desired_accuracy": "BestForNavigation" }))
        .await;
    response.assert_status_ok();
    let config: ConfigResponse = response.json();
    let temporary = config.temporary.unwrap();
    assert_eq!(config.effective, temporary);
    // Merged over the base, so the base distance filter carries over.
    assert!((temporary.distance_filter_meters - 25.0).abs() < f64::EPSILON);

    let first: RevertTemporaryResponse = server.delete("/api/config/temporary").await.json();
    let second: RevertTemporaryResponse = server.delete("/api/config/temporary").await.json();
    assert!(first.reverted);
    assert!(!second.reverted);
    assert_eq!(first.config.effective, second.config.effective);
    assert_eq!(second.config.effective, second.config.base);
}

#[tokio::test]
async fn test_invalid_configuration_is_rejected() {
    let server = server(AuthorizationState::Authorized);

    let response = server
        .put("/api/config")
        .json(&json!({ "update_interval_ms": 0 }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let error: ErrorResponse = response.json();
    assert_eq!(error.error, "INVALID_ARGUMENT");

    let response = server
        .put("/api/config/temporary")
        .json(&json!({ "desired_accuracy": "Everywhere" }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let error: ErrorResponse = response.json();
    assert_eq!(error.error, "INVALID_BODY");
}

#[tokio::test]
async fn test_history_keeps_non_decreasing_order() {
    let server = server(AuthorizationState::Authorized);

    let mut dispositions = Vec::new();
    for t in [100, 200, 150, 300] {
        let response: SubmitLocationResponse =
            server.post("/api/locations").json(&sample(t)).await.json();
        dispositions.push(serde_json::to_value(response.disposition).unwrap());
    }
    assert_eq!(
        dispositions,
        vec![json!("accepted"), json!("accepted"), json!("outOfOrder"), json!("accepted")]
    );

    let history: LocationsResponse = server
        .get("/api/locations")
        .add_query_param("n", 10)
        .await
        .json();
    let times: Vec<i64> = history.locations.iter().map(|s| s.time).collect();
    assert_eq!(times, vec![100, 200, 300]);
    assert_eq!(history.count, 3);
}

#[tokio::test]
async fn test_last_locations_window() {
    let server = server(AuthorizationState::Authorized);
    for t in 1..=5 {
        server
            .post("/api/locations")
            .json(&sample(t))
            .await
            .assert_status_ok();
    }

    let history: LocationsResponse = server
        .get("/api/locations")
        .add_query_param("n", 2)
        .await
        .json();
    let times: Vec<i64> = history.locations.iter().map(|s| s.time).collect();
    assert_eq!(times, vec![4, 5]);

    let latest: LocationsResponse = server.get("/api/locations").await.json();
    assert_eq!(latest.locations.len(), 1);
    assert_eq!(latest.locations[0].time, 5);
}

#[tokio::test]
async fn test_non_positive_count_is_invalid() {
    let server = server(AuthorizationState::Authorized);
    for n in ["0", "-1"] {
        let response = server.get("/api/locations").add_query_param("n", n).await;
        response.assert_status(StatusCode::BAD_REQUEST);
        let error: ErrorResponse = response.json();
        assert_eq!(error.error, "INVALID_ARGUMENT");
    }

    let response = server
        .get("/api/locations")
        .add_query_param("n", "many")
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_start_requires_authorization() {
    let server = server_with(
        AuthorizationState::Denied,
        vec![ScriptedReading::Fix(LocationSample::new(1.0, 1.0, 5.0, 1))],
    );

    let response = server.post("/api/sampling/start").await;
    response.assert_status(StatusCode::FORBIDDEN);
    let error: ErrorResponse = response.json();
    assert_eq!(error.error, "PERMISSION_DENIED");
    assert_eq!(error.details.unwrap()["authorization"], "denied");

    let history: LocationsResponse = server
        .get("/api/locations")
        .add_query_param("n", 10)
        .await
        .json();
    assert!(history.locations.is_empty());

    server
        .post("/api/locations")
        .json(&sample(1))
        .await
        .assert_status(StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_authorize_then_sample() {
    let server = server_with(
        AuthorizationState::NotDetermined,
        vec![
            ScriptedReading::Fix(LocationSample::new(1.0, 1.0, 5.0, 1)),
            ScriptedReading::Failure("no satellites".into()),
            ScriptedReading::Fix(LocationSample::new(2.0, 1.0, 5.0, 2)),
        ],
    );

    let auth: serde_json::Value = server.get("/api/authorization").await.json();
    assert_eq!(auth["state"], "notDetermined");
    assert_eq!(auth["can_sample"], false);

    let auth: serde_json::Value = server.post("/api/authorization/request").await.json();
    assert_eq!(auth["state"], "authorized");

    let response = server.post("/api/sampling/start").await;
    response.assert_status_ok();
    let status: serde_json::Value = response.json();
    assert_eq!(status["running"], true);

    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    let status: serde_json::Value = server.post("/api/sampling/stop").await.json();
    assert_eq!(status["running"], false);
    assert_eq!(status["accepted"], 2);
    assert_eq!(status["failures"], 1);

    let history: LocationsResponse = server
        .get("/api/locations")
        .add_query_param("n", 10)
        .await
        .json();
    assert_eq!(history.count, 2);
}

#[tokio::test]
async fn test_revoke_stops_sampling() {
    let server = server(AuthorizationState::Authorized);
    server.post("/api/sampling/start").await.assert_status_ok();

    let auth: serde_json::Value = server.post("/api/authorization/revoke").await.json();
    assert_eq!(auth["state"], "denied");

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    let status: serde_json::Value = server.get("/api/sampling").await.json();
    assert_eq!(status["running"], false);
}

#[tokio::test]
async fn test_unknown_route_is_json_404() {
    let server = server(AuthorizationState::Authorized);
    let response = server.get("/api/nowhere").await;
    response.assert_status(StatusCode::NOT_FOUND);
    let error: ErrorResponse = response.json();
    assert_eq!(error.error, "NOT_FOUND");
}

#[tokio::test]
async fn test_openapi_document_is_served() {
    let server = server(AuthorizationState::Authorized);
    let response = server.get("/api/openapi.json").await;
    response.assert_status_ok();
    let spec: serde_json::Value = response.json();
    assert_eq!(spec["info"]["title"], "locus API");
    assert!(spec["paths"]["/api/locations/stream"].is_object());
}

#[tokio::test]
async fn test_non_finite_location_is_rejected() {
    let server = server(AuthorizationState::Authorized);
    server.post("/api/locations").json(&sample(1)).await.assert_status_ok();

    let response = server
        .post("/api/locations")
        .json(&json!({ "latitude": 91.0, "longitude": 0.0, "accuracy": 5.0, "time": 2 }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let error: ErrorResponse = response.json();
    assert_eq!(error.error, "INVALID_ARGUMENT");

    let history: LocationsResponse = server
        .get("/api/locations")
        .add_query_param("n", 10)
        .await
        .json();
    assert_eq!(history.count, 1);
}

/// Reads SSE chunks until `needle` has been seen, returning everything read.
async fn read_until<S, E>(body: &mut S, needle: &str) -> String
where
    S: futures::Stream<Item = Result<axum::body::Bytes, E>> + Unpin,
    E: std::fmt::Debug,
{
    let mut text = String::new();
    while !text.contains(needle) {
        let chunk = tokio::time::timeout(Duration::from_secs(2), body.next())
            .await
            .unwrap_or_else(|_| panic!("timed out waiting for {needle:?}, got {text:?}"))
            .expect("stream ended early")
            .unwrap();
        text.push_str(&String::from_utf8_lossy(&chunk));
    }
    text
}

#[tokio::test]
async fn test_stream_delivers_events_and_unsubscribes_on_disconnect() {
    let state = state_with(
        AuthorizationState::Authorized,
        vec![ScriptedReading::Failure("no satellites".into())],
    );
    let service = Arc::clone(&state.service);

    let response = create_router(state)
        .oneshot(
            Request::get("/api/locations/stream")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(service.subscriber_count(), 1);
    let mut body = response.into_body().into_data_stream();

    service
        .submit_sample(LocationSample::new(1.0, 1.0, 5.0, 1))
        .unwrap();
    let text = read_until(&mut body, "\"time\":1").await;
    assert!(text.contains("event: location"), "{text}");
    assert!(text.contains("\"success\":true"), "{text}");

    service.start().unwrap();
    let text = read_until(&mut body, "no satellites").await;
    assert!(text.contains("event: error"), "{text}");
    assert!(text.contains("\"success\":false"), "{text}");
    service.stop();

    drop(body);
    assert_eq!(service.subscriber_count(), 0);
}

#[tokio::test]
async fn test_stalled_stream_client_does_not_block_submissions() {
    let state = state_with(AuthorizationState::Authorized, Vec::new());
    let service = Arc::clone(&state.service);

    let response = create_router(state)
        .oneshot(
            Request::get("/api/locations/stream")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    // Never read the body.
    let total = i64::try_from(STREAM_BUFFER).unwrap() * 4;
    for t in 1..=total {
        service.submit_sample(LocationSample::new(0.0, 0.0, 5.0, t * 60_000)).unwrap();
    }
    assert_eq!(service.get_last_locations(1).unwrap()[0].time, total * 60_000);
    assert_eq!(service.subscriber_count(), 1);

    let mut body = response.into_body().into_data_stream();
    let text = read_until(&mut body, "\"time\":60000").await;
    assert!(text.contains("event: location"), "{text}");
}

#[tokio::test]
async fn test_stop_saves_history() {
    let dir = tempfile::TempDir::new().unwrap();
    let mut settings = Settings::default();
    settings.history.data_dir = dir.path().to_path_buf();
    settings.authorization.initial = AuthorizationState::Authorized;
    let service = LocationService::create(
        &settings,
        Arc::new(ScriptedProvider::default()),
        Arc::new(StaticConsent(AuthorizationState::Authorized)),
    )
    .unwrap();
    let server = TestServer::new(create_router(AppState::new(service, settings))).unwrap();

    server.post("/api/sampling/start").await.assert_status_ok();
    server.post("/api/locations").json(&sample(1)).await.assert_status_ok();
    let status: serde_json::Value = server.post("/api/sampling/stop").await.json();
    assert_eq!(status["running"], false);

    let saved = std::fs::read_to_string(dir.path().join("history.json")).unwrap();
    let saved: serde_json::Value = serde_json::from_str(&saved).unwrap();
    assert_eq!(saved["samples"][0]["time"], 1);
}
