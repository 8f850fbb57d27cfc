//! Persistent storage for location history.
//!
//! The history is saved as a single JSON snapshot so that recent locations
//! survive a restart of the service.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{LocusError, Result};
use crate::types::LocationSample;

const SNAPSHOT_FILE: &str = "history.json";
const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Serialize)]
struct Snapshot<'a> {
    version: u32,
    samples: &'a [LocationSample],
}

// Entries are decoded one by one so that a single bad sample only costs itself.
#[derive(Debug, Deserialize)]
struct RawSnapshot {
    version: u32,
    samples: Vec<serde_json::Value>,
}

/// Storage backend for location history.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    data_dir: PathBuf,
}

impl HistoryStore {
    /// Create a new storage instance.
    ///
    /// # Arguments
    ///
    /// * `data_dir` - Directory to store data files
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    /// Path of the snapshot file.
    #[must_use]
    pub fn snapshot_path(&self) -> PathBuf {
        self.data_dir.join(SNAPSHOT_FILE)
    }

    /// Load the saved samples, oldest first.
    ///
    /// A missing snapshot yields an empty history. Entries that do not decode
    /// or fail [`LocationSample::validate`] are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot exists but cannot be read or parsed.
    pub fn load(&self) -> Result<Vec<LocationSample>> {
        let path = self.snapshot_path();
        if !path.exists() {
            debug!(path = %path.display(), "No history snapshot found");
            return Ok(Vec::new());
        }

        let content = std::fs::read_to_string(&path)?;
        let snapshot: RawSnapshot = serde_json::from_str(&content).map_err(|e| {
            LocusError::PersistenceError(format!("Failed to parse {}: {e}", path.display()))
        })?;
        if snapshot.version != SNAPSHOT_VERSION {
            warn!(
                version = snapshot.version,
                expected = SNAPSHOT_VERSION,
                "Ignoring history snapshot with unknown version"
            );
            return Ok(Vec::new());
        }

        let total = snapshot.samples.len();
        let samples: Vec<LocationSample> = snapshot
            .samples
            .into_iter()
            .filter_map(|value| {
                serde_json::from_value::<LocationSample>(value)
                    .ok()
                    .filter(|sample| sample.validate().is_ok())
            })
            .collect();
        if samples.len() < total {
            warn!(
                skipped = total - samples.len(),
                path = %path.display(),
                "Skipped unreadable samples in history snapshot"
            );
        }
        Ok(samples)
    }

    /// Save `samples` atomically (write to a temporary file, then rename).
    ///
    /// # Errors
    ///
    /// Returns an error if the data directory or the file cannot be written.
    pub fn save(&self, samples: &[LocationSample]) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;

        let snapshot = Snapshot {
            version: SNAPSHOT_VERSION,
            samples,
        };
        let content = serde_json::to_string_pretty(&snapshot)?;

        let path = self.snapshot_path();
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, &path)?;
        debug!(path = %path.display(), count = samples.len(), "History snapshot saved");
        Ok(())
    }
}

/// Default data directory.
///
/// On Linux: `/var/lib/locus/`
/// Elsewhere: the platform data directory for `locus`.
#[must_use]
pub fn default_data_dir() -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        PathBuf::from("/var/lib/locus")
    }
    #[cfg(not(target_os = "linux"))]
    {
        directories::ProjectDirs::from("", "", "locus")
            .map_or_else(|| PathBuf::from("./data"), |dirs| dirs.data_dir().to_path_buf())
    }
}
