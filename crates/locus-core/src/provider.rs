//! Location sources feeding the sampling engine.
//!
//! A [`LocationProvider`] is asked for one reading per sampling cycle and is
//! told the effective configuration of that cycle. Two providers ship with the
//! crate:
//! - [`ScriptedProvider`] replays a fixed list of readings (or failures)
//! - [`SimulatedProvider`] walks from an origin at a constant speed and heading

use std::collections::VecDeque;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::config::LocationConfiguration;
use crate::error::{LocusError, Result};
use crate::types::{LocationSample, EARTH_RADIUS_METERS};

/// Source of raw location readings.
#[async_trait]
pub trait LocationProvider: Send + Sync {
    /// Produce the current reading.
    ///
    /// `Ok(None)` means no fix is available this cycle.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying source failed; the sampling loop
    /// reports it and carries on with the next cycle.
    async fn read(&self, config: &LocationConfiguration) -> Result<Option<LocationSample>>;

    /// Short name used in logs.
    fn name(&self) -> &'static str;
}

/// One scripted step.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptedReading {
    /// Report this sample.
    Fix(LocationSample),
    /// Report no fix.
    NoFix,
    /// Fail with this message.
    Failure(String),
}

/// Replays a fixed sequence of readings, then reports no fix.
#[derive(Debug, Default)]
pub struct ScriptedProvider {
    script: Mutex<VecDeque<ScriptedReading>>,
    last_config: Mutex<Option<LocationConfiguration>>,
}

impl ScriptedProvider {
    /// Create a provider that replays `script` in order.
    #[must_use]
    pub fn new(script: impl IntoIterator<Item = ScriptedReading>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            last_config: Mutex::new(None),
        }
    }

    /// Create a provider that replays `samples` in order.
    #[must_use]
    pub fn from_samples(samples: impl IntoIterator<Item = LocationSample>) -> Self {
        Self::new(samples.into_iter().map(ScriptedReading::Fix))
    }

    /// Queue more readings behind the current script.
    pub fn push(&self, reading: ScriptedReading) {
        self.script.lock().push_back(reading);
    }

    /// Readings not yet replayed.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.script.lock().len()
    }

    /// Configuration passed to the most recent `read`.
    #[must_use]
    pub fn last_config(&self) -> Option<LocationConfiguration> {
        self.last_config.lock().clone()
    }
}

#[async_trait]
impl LocationProvider for ScriptedProvider {
    async fn read(&self, config: &LocationConfiguration) -> Result<Option<LocationSample>> {
        *self.last_config.lock() = Some(config.clone());
        let next = self.script.lock().pop_front();
        match next {
            Some(ScriptedReading::Fix(sample)) => Ok(Some(sample)),
            Some(ScriptedReading::Failure(message)) => Err(LocusError::ProviderFailed(message)),
            Some(ScriptedReading::NoFix) | None => Ok(None),
        }
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Parameters of a simulated walk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationSettings {
    /// Starting latitude in degrees.
    pub origin_latitude: f64,
    /// Starting longitude in degrees.
    pub origin_longitude: f64,
    /// Ground speed in metres per second.
    pub speed_mps: f64,
    /// Direction of travel in degrees clockwise from north.
    pub heading_deg: f64,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            origin_latitude: 48.8584,
            origin_longitude: 2.2945,
            speed_mps: 1.4,
            heading_deg: 90.0,
        }
    }
}

/// Deterministic straight-line walk driven by the wall clock.
///
/// The position at time `t` is the origin displaced by
/// `speed * (t - start)` along the heading. The reported accuracy is the
/// requested accuracy class, floored at three metres.
#[derive(Debug)]
pub struct SimulatedProvider {
    settings: SimulationSettings,
    started_at_ms: i64,
}

impl SimulatedProvider {
    /// Start a walk now.
    #[must_use]
    pub fn new(settings: SimulationSettings) -> Self {
        Self::starting_at(settings, Utc::now().timestamp_millis())
    }

    /// Start a walk at `started_at_ms` (epoch millis).
    #[must_use]
    pub const fn starting_at(settings: SimulationSettings, started_at_ms: i64) -> Self {
        Self {
            settings,
            started_at_ms,
        }
    }

    /// Position of the walk at `time_ms`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn position_at(&self, time_ms: i64, accuracy: f64) -> LocationSample {
        let elapsed_secs = (time_ms - self.started_at_ms).max(0) as f64 / 1_000.0;
        let travelled = self.settings.speed_mps * elapsed_secs;
        let heading = self.settings.heading_deg.to_radians();

        let north = travelled * heading.cos();
        let east = travelled * heading.sin();
        let lat0 = self.settings.origin_latitude.to_radians();

        let latitude = self.settings.origin_latitude + (north / EARTH_RADIUS_METERS).to_degrees();
        let longitude = self.settings.origin_longitude
            + (east / (EARTH_RADIUS_METERS * lat0.cos())).to_degrees();

        LocationSample::new(latitude, longitude, accuracy, time_ms)
    }
}

#[async_trait]
impl LocationProvider for SimulatedProvider {
    async fn read(&self, config: &LocationConfiguration) -> Result<Option<LocationSample>> {
        let accuracy = config.desired_accuracy.radius_meters().max(3.0);
        Ok(Some(
            self.position_at(Utc::now().timestamp_millis(), accuracy),
        ))
    }

    fn name(&self) -> &'static str {
        "simulated"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DesiredAccuracy;

    #[tokio::test]
    async fn test_scripted_replays_in_order_then_goes_quiet() {
        let provider = ScriptedProvider::new([
            ScriptedReading::Fix(LocationSample::new(1.0, 1.0, 5.0, 10)),
            ScriptedReading::Failure("no satellites".into()),
            ScriptedReading::NoFix,
        ]);
        let config = LocationConfiguration::default();

        assert_eq!(provider.read(&config).await.unwrap().map(|s| s.time), Some(10));
        assert!(matches!(
            provider.read(&config).await,
            Err(LocusError::ProviderFailed(_))
        ));
        assert!(provider.read(&config).await.unwrap().is_none());
        assert!(provider.read(&config).await.unwrap().is_none());
        assert_eq!(provider.last_config(), Some(config));
    }

    #[test]
    fn test_simulated_walk_covers_expected_distance() {
        let provider = SimulatedProvider::starting_at(
            SimulationSettings {
                speed_mps: 10.0,
                heading_deg: 0.0,
                ..SimulationSettings::default()
            },
            0,
        );
        let start = provider.position_at(0, 5.0);
        let later = provider.position_at(60_000, 5.0);

        let travelled = start.distance_to(&later);
        assert!((travelled - 600.0).abs() < 1.0, "got {travelled}");
        assert!(later.latitude > start.latitude);
    }

    #[tokio::test]
    async fn test_simulated_accuracy_follows_hint() {
        let provider = SimulatedProvider::new(SimulationSettings::default());
        let config = LocationConfiguration {
            desired_accuracy: DesiredAccuracy::Kilometer,
            ..LocationConfiguration::default()
        };
        let sample = provider.read(&config).await.unwrap().unwrap();
        assert!((sample.accuracy - 1_000.0).abs() < f64::EPSILON);

        let config = LocationConfiguration {
            desired_accuracy: DesiredAccuracy::BestForNavigation,
            ..LocationConfiguration::default()
        };
        let sample = provider.read(&config).await.unwrap().unwrap();
        assert!((sample.accuracy - 3.0).abs() < f64::EPSILON);
    }
}
