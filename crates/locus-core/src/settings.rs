//! Service settings.
//!
//! Settings are read from a TOML file and overridden by environment variables
//! of the form `LOCUS__<SECTION>__<KEY>` (for example
//! `LOCUS__HISTORY__CAPACITY=1000`). Every field has a default, so a missing
//! file yields a working configuration.
//!
//! ```toml
//! [server]
//! bind_address = "0.0.0.0:3000"
//!
//! [history]
//! capacity = 500
//! persist = true
//! data_dir = "/var/lib/locus"
//!
//! [location]
//! desired_accuracy = "NearestTenMeters"
//! distance_filter_meters = 25.0
//!
//! [provider]
//! kind = "simulated"
//! speed_mps = 1.4
//!
//! [authorization]
//! initial = "notDetermined"
//! consent = "authorized"
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::{LocationConfiguration, PartialLocationConfiguration};
use crate::error::{LocusError, Result};
use crate::history::DEFAULT_HISTORY_CAPACITY;
use crate::permission::{AuthorizationState, ConsentPrompt, StaticConsent};
use crate::provider::{LocationProvider, ScriptedProvider, SimulatedProvider, SimulationSettings};
use crate::storage::default_data_dir;

/// Environment variable naming an alternative settings file.
pub const SETTINGS_PATH_ENV: &str = "LOCUS_CONFIG";

/// Top-level settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// HTTP server settings.
    pub server: ServerSettings,
    /// History retention and persistence.
    pub history: HistorySettings,
    /// Overrides of the built-in location configuration defaults.
    pub location: PartialLocationConfiguration,
    /// Location source.
    pub provider: ProviderSettings,
    /// Authorization behavior.
    pub authorization: AuthorizationSettings,
}

/// HTTP server settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Socket address to listen on.
    pub bind_address: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3000".to_string(),
        }
    }
}

/// History retention and persistence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistorySettings {
    /// Maximum number of samples retained.
    pub capacity: usize,
    /// Save history on stop and reload it on startup.
    pub persist: bool,
    /// Directory holding the history snapshot.
    pub data_dir: PathBuf,
}

impl Default for HistorySettings {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_HISTORY_CAPACITY,
            persist: true,
            data_dir: default_data_dir(),
        }
    }
}

/// Which location provider to run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Straight-line walk from an origin.
    #[default]
    Simulated,
    /// Produces no readings of its own; samples are submitted externally.
    Scripted,
}

/// Location source settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    /// Provider implementation.
    pub kind: ProviderKind,
    /// Parameters of the simulated walk.
    #[serde(flatten)]
    pub simulation: SimulationSettings,
}

impl ProviderSettings {
    /// Instantiate the configured provider.
    #[must_use]
    pub fn build(&self) -> Arc<dyn LocationProvider> {
        match self.kind {
            ProviderKind::Simulated => Arc::new(SimulatedProvider::new(self.simulation.clone())),
            ProviderKind::Scripted => Arc::new(ScriptedProvider::default()),
        }
    }
}

/// Authorization behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthorizationSettings {
    /// State at startup.
    pub initial: AuthorizationState,
    /// Answer given by the consent flow.
    pub consent: AuthorizationState,
}

impl Default for AuthorizationSettings {
    fn default() -> Self {
        Self {
            initial: AuthorizationState::NotDetermined,
            consent: AuthorizationState::Authorized,
        }
    }
}

impl AuthorizationSettings {
    /// Consent flow answering with the configured `consent` state.
    #[must_use]
    pub fn consent_prompt(&self) -> Arc<dyn ConsentPrompt> {
        Arc::new(StaticConsent(self.consent))
    }
}

impl Settings {
    /// Load settings from `path` (optional) and the environment.
    ///
    /// # Errors
    ///
    /// Returns `LocusError::ConfigParseError` if the file or an environment
    /// override cannot be parsed, or a value is out of range.
    pub fn load(path: &Path) -> Result<Self> {
        let settings: Self = config::Config::builder()
            .add_source(config::File::from(path.to_path_buf()).required(false))
            .add_source(
                config::Environment::with_prefix("LOCUS")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        info!(path = %path.display(), "Settings loaded");
        Ok(settings)
    }

    /// Load settings from `path`, which must exist.
    ///
    /// # Errors
    ///
    /// Returns `LocusError::ConfigNotFound` if there is no file at `path`,
    /// otherwise see [`Settings::load`].
    pub fn load_required(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(LocusError::ConfigNotFound(path.to_path_buf()));
        }
        Self::load(path)
    }

    /// Load settings from the default location (see [`Settings::default_path`]).
    ///
    /// A path named by `LOCUS_CONFIG` must exist; the platform default may not.
    ///
    /// # Errors
    ///
    /// See [`Settings::load_required`].
    pub fn load_default() -> Result<Self> {
        let path = Self::default_path()?;
        if std::env::var_os(SETTINGS_PATH_ENV).is_some() {
            Self::load_required(&path)
        } else {
            Self::load(&path)
        }
    }

    /// Write settings to `path` as TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be serialized or written.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Check cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns `LocusError::ConfigParseError` describing the first problem.
    pub fn validate(&self) -> Result<()> {
        if self.history.capacity == 0 {
            return Err(LocusError::ConfigParseError(
                "history.capacity must be at least 1".to_string(),
            ));
        }
        if self.server.bind_address.parse::<std::net::SocketAddr>().is_err() {
            return Err(LocusError::ConfigParseError(format!(
                "server.bind_address is not a socket address: '{}'",
                self.server.bind_address
            )));
        }
        self.location
            .validate()
            .map_err(|e| LocusError::ConfigParseError(format!("location: {e}")))?;
        Ok(())
    }

    /// Built-in defaults with the `[location]` overrides applied.
    #[must_use]
    pub fn location_defaults(&self) -> LocationConfiguration {
        self.location.merge_over(&LocationConfiguration::default())
    }

    /// Settings file path.
    ///
    /// `LOCUS_CONFIG` wins; otherwise `/etc/locus/config.toml` on Linux and the
    /// platform config directory elsewhere.
    ///
    /// # Errors
    ///
    /// Returns an error if no config directory can be determined.
    pub fn default_path() -> Result<PathBuf> {
        if let Ok(path) = std::env::var(SETTINGS_PATH_ENV) {
            return Ok(PathBuf::from(path));
        }
        #[cfg(target_os = "linux")]
        {
            Ok(PathBuf::from("/etc/locus/config.toml"))
        }
        #[cfg(not(target_os = "linux"))]
        {
            let dirs = directories::ProjectDirs::from("", "", "locus").ok_or_else(|| {
                LocusError::ConfigParseError("Cannot determine config directory".into())
            })?;
            Ok(dirs.config_dir().join("config.toml"))
        }
    }
}
