//! # locus-server
//!
//! HTTP server for the locus location service.
//!
//! This binary provides:
//! - REST API for configuration, history, authorization and sampling control
//! - Server-sent events for live location updates
//! - OpenAPI document at `/api/openapi.json`
//! - Structured logging to file and stdout
//!
//! ## Running
//!
//! ```bash
//! # Development
//! cargo run --package locus-server
//!
//! # Production
//! LOCUS_PRODUCTION=1 LOCUS_CONFIG=/etc/locus/config.toml ./locus-server
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

use std::net::SocketAddr;

use anyhow::Context;
use locus_core::Settings;
use locus_server::api::create_router;
use locus_server::logging;
use locus_server::state::AppState;
use tokio::net::TcpListener;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init(logging::production_requested())?;

    info!(version = env!("CARGO_PKG_VERSION"), "Starting locus-server");

    let settings_path = Settings::default_path()?;
    let settings = Settings::load_default()
        .with_context(|| format!("Failed to load settings from {}", settings_path.display()))?;

    let addr: SocketAddr = settings
        .server
        .bind_address
        .parse()
        .context("Invalid server.bind_address")?;

    let state = AppState::from_settings(settings)?;
    let service = state.service.clone();

    if service.check_authorization().is_authorized() {
        if let Err(e) = service.start() {
            warn!(error = %e, "Sampling did not start");
        }
    } else {
        info!(
            authorization = %service.check_authorization(),
            "Sampling waits for authorization"
        );
    }

    let app = create_router(state);
    let listener = TcpListener::bind(addr).await?;
    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    service.dispose();
    info!("locus-server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
