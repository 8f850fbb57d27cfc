//! Location configuration and the configuration store.
//!
//! The store holds two slots:
//! - the **base** configuration, changed by [`ConfigurationStore::set_base`]
//! - an optional **temporary** override, installed by
//!   [`ConfigurationStore::set_temporary`] and cleared by
//!   [`ConfigurationStore::revert_temporary`]
//!
//! Both slots always hold complete configurations (partials are merged on
//! write), so the effective configuration is simply "temporary if present,
//! else base". Both slots live behind one lock so a reader never observes a
//! half-applied merge.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;

use crate::error::{LocusError, Result};

/// Requested accuracy class, forwarded to the location provider as a hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum DesiredAccuracy {
    /// Highest precision, intended for navigation.
    BestForNavigation,
    /// Best available precision.
    Best,
    /// Within roughly ten metres.
    NearestTenMeters,
    /// Within roughly a hundred metres.
    HundredMeters,
    /// Within roughly a kilometre.
    Kilometer,
    /// Within roughly three kilometres.
    ThreeKilometers,
}

impl DesiredAccuracy {
    /// Nominal accuracy radius in metres.
    #[must_use]
    pub const fn radius_meters(self) -> f64 {
        match self {
            Self::BestForNavigation => 0.0,
            Self::Best => 5.0,
            Self::NearestTenMeters => 10.0,
            Self::HundredMeters => 100.0,
            Self::Kilometer => 1_000.0,
            Self::ThreeKilometers => 3_000.0,
        }
    }
}

/// A complete location configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "desired_accuracy": "HundredMeters",
    "distance_filter_meters": 100.0,
    "update_interval_ms": 10000,
    "poll_interval_ms": 1000
}))]
pub struct LocationConfiguration {
    /// Accuracy class requested from the provider.
    pub desired_accuracy: DesiredAccuracy,

    /// Minimum movement since the last accepted sample for a new one to be accepted.
    #[schema(example = 100.0, minimum = 0)]
    pub distance_filter_meters: f64,

    /// Time since the last accepted sample after which a new one is accepted regardless of movement.
    #[schema(example = 10000, minimum = 1)]
    pub update_interval_ms: u64,

    /// Period of the sampling cycle.
    #[schema(example = 1000, minimum = 1)]
    pub poll_interval_ms: u64,
}

impl Default for LocationConfiguration {
    fn default() -> Self {
        Self {
            desired_accuracy: DesiredAccuracy::HundredMeters,
            distance_filter_meters: 100.0,
            update_interval_ms: 10_000,
            poll_interval_ms: 1_000,
        }
    }
}

/// A configuration with every field optional, as accepted by `configure`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
#[schema(example = json!({
    "desired_accuracy": "Best",
    "distance_filter_meters": 10.0
}))]
pub struct PartialLocationConfiguration {
    /// Accuracy class requested from the provider.
    pub desired_accuracy: Option<DesiredAccuracy>,

    /// Minimum movement in metres.
    pub distance_filter_meters: Option<f64>,

    /// Time-based acceptance threshold in milliseconds.
    pub update_interval_ms: Option<u64>,

    /// Sampling cycle period in milliseconds.
    pub poll_interval_ms: Option<u64>,
}

impl PartialLocationConfiguration {
    /// Check every present field against its domain.
    ///
    /// # Errors
    ///
    /// Returns `LocusError::InvalidArgument` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if let Some(distance) = self.distance_filter_meters {
            if !distance.is_finite() || distance < 0.0 {
                return Err(LocusError::InvalidArgument(format!(
                    "distance_filter_meters must be a finite value >= 0 (got {distance})"
                )));
            }
        }
        if self.update_interval_ms == Some(0) {
            return Err(LocusError::InvalidArgument(
                "update_interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.poll_interval_ms == Some(0) {
            return Err(LocusError::InvalidArgument(
                "poll_interval_ms must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Overwrite the fields of `base` that are set here.
    #[must_use]
    pub fn merge_over(&self, base: &LocationConfiguration) -> LocationConfiguration {
        LocationConfiguration {
            desired_accuracy: self.desired_accuracy.unwrap_or(base.desired_accuracy),
            distance_filter_meters: self
                .distance_filter_meters
                .unwrap_or(base.distance_filter_meters),
            update_interval_ms: self.update_interval_ms.unwrap_or(base.update_interval_ms),
            poll_interval_ms: self.poll_interval_ms.unwrap_or(base.poll_interval_ms),
        }
    }

    /// Returns `true` if no field is set.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.desired_accuracy.is_none()
            && self.distance_filter_meters.is_none()
            && self.update_interval_ms.is_none()
            && self.poll_interval_ms.is_none()
    }
}

#[derive(Debug, Clone)]
struct Slots {
    base: LocationConfiguration,
    temporary: Option<LocationConfiguration>,
}

/// Point-in-time view of both slots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigurationSnapshot {
    /// The persistent configuration.
    pub base: LocationConfiguration,
    /// The override, if one is installed.
    pub temporary: Option<LocationConfiguration>,
}

impl ConfigurationSnapshot {
    /// The configuration in force for this snapshot.
    #[must_use]
    pub fn effective(&self) -> &LocationConfiguration {
        self.temporary.as_ref().unwrap_or(&self.base)
    }
}

/// Holds the base configuration and the optional temporary override.
#[derive(Debug)]
pub struct ConfigurationStore {
    slots: RwLock<Slots>,
}

impl ConfigurationStore {
    /// Create a store whose base configuration is `defaults`.
    #[must_use]
    pub fn new(defaults: LocationConfiguration) -> Self {
        Self {
            slots: RwLock::new(Slots {
                base: defaults,
                temporary: None,
            }),
        }
    }

    /// Merge `partial` over the current base configuration.
    ///
    /// An installed temporary override stays in force.
    ///
    /// # Errors
    ///
    /// Returns `LocusError::InvalidArgument` if a field is out of range; the
    /// store is left unchanged.
    pub fn set_base(&self, partial: &PartialLocationConfiguration) -> Result<()> {
        partial.validate()?;
        let mut slots = self.slots.write();
        slots.base = partial.merge_over(&slots.base);
        info!(base = ?slots.base, "Base location configuration updated");
        Ok(())
    }

    /// Merge `partial` over the current base configuration and install the
    /// result as the temporary override, replacing any previous override.
    ///
    /// # Errors
    ///
    /// Returns `LocusError::InvalidArgument` if a field is out of range; the
    /// store is left unchanged.
    pub fn set_temporary(&self, partial: &PartialLocationConfiguration) -> Result<()> {
        partial.validate()?;
        let mut slots = self.slots.write();
        let merged = partial.merge_over(&slots.base);
        info!(temporary = ?merged, "Temporary location configuration installed");
        slots.temporary = Some(merged);
        Ok(())
    }

    /// Clear the temporary override. Returns `true` if one was installed.
    pub fn revert_temporary(&self) -> bool {
        let reverted = self.slots.write().temporary.take().is_some();
        if reverted {
            info!("Temporary location configuration reverted");
        }
        reverted
    }

    /// The configuration currently in force.
    #[must_use]
    pub fn effective(&self) -> LocationConfiguration {
        let slots = self.slots.read();
        slots.temporary.as_ref().unwrap_or(&slots.base).clone()
    }

    /// Both slots, read under a single lock.
    #[must_use]
    pub fn snapshot(&self) -> ConfigurationSnapshot {
        let slots = self.slots.read();
        ConfigurationSnapshot {
            base: slots.base.clone(),
            temporary: slots.temporary.clone(),
        }
    }

    /// Returns `true` if a temporary override is installed.
    #[must_use]
    pub fn has_temporary(&self) -> bool {
        self.slots.read().temporary.is_some()
    }
}

impl Default for ConfigurationStore {
    fn default() -> Self {
        Self::new(LocationConfiguration::default())
    }
}
