//! Application state shared across handlers.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use locus_core::{LocationService, Settings};

/// Shared application state.
pub type SharedState = Arc<AppState>;

/// State handed to every handler.
#[derive(Debug)]
pub struct AppState {
    /// The location service.
    pub service: Arc<LocationService>,

    /// Settings the service was created from.
    pub settings: Settings,

    /// When this state was created.
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Wrap an existing service.
    #[must_use]
    pub fn new(service: Arc<LocationService>, settings: Settings) -> SharedState {
        Arc::new(Self {
            service,
            settings,
            started_at: Utc::now(),
        })
    }

    /// Create the service described by `settings` and wrap it.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings are invalid.
    pub fn from_settings(settings: Settings) -> anyhow::Result<SharedState> {
        let service = LocationService::from_settings(&settings)?;
        Ok(Self::new(service, settings))
    }

    /// Seconds since the state was created.
    #[must_use]
    pub fn uptime_secs(&self) -> u64 {
        u64::try_from((Utc::now() - self.started_at).num_seconds()).unwrap_or(0)
    }
}
