//! Shared types and OpenAPI schemas.
//!
//! Location samples and the event envelope delivered to subscribers. The
//! configuration types live in [`crate::config`].

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::LocusError;

/// Mean Earth radius in metres.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// A single accepted (or candidate) location fix.
///
/// Samples are plain values: once captured they are copied into the history
/// and handed to subscribers by value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "latitude": 48.8584,
    "longitude": 2.2945,
    "accuracy": 12.5,
    "time": 1_736_912_400_000_i64
}))]
pub struct LocationSample {
    /// Latitude in decimal degrees.
    #[schema(example = 48.8584)]
    pub latitude: f64,

    /// Longitude in decimal degrees.
    #[schema(example = 2.2945)]
    pub longitude: f64,

    /// Horizontal accuracy radius in metres.
    #[schema(example = 12.5, minimum = 0)]
    pub accuracy: f64,

    /// Fix time, milliseconds since the Unix epoch.
    #[schema(example = 1_736_912_400_000_i64)]
    pub time: i64,
}

impl LocationSample {
    /// Create a new sample. Negative accuracy is clamped to zero.
    #[must_use]
    pub fn new(latitude: f64, longitude: f64, accuracy: f64, time: i64) -> Self {
        Self {
            latitude,
            longitude,
            accuracy: accuracy.max(0.0),
            time,
        }
    }

    /// Placeholder reported before any fix is known.
    #[must_use]
    pub const fn unknown() -> Self {
        Self {
            latitude: -1.0,
            longitude: -1.0,
            accuracy: f64::MAX,
            time: 0,
        }
    }

    /// Check that the coordinates are finite and on the globe.
    ///
    /// # Errors
    ///
    /// Returns `LocusError::InvalidArgument` naming the offending field.
    pub fn validate(&self) -> Result<(), LocusError> {
        if !self.latitude.is_finite() || !(-90.0..=90.0).contains(&self.latitude) {
            return Err(LocusError::InvalidArgument(format!(
                "latitude must be within [-90, 90] (got {})",
                self.latitude
            )));
        }
        if !self.longitude.is_finite() || !(-180.0..=180.0).contains(&self.longitude) {
            return Err(LocusError::InvalidArgument(format!(
                "longitude must be within [-180, 180] (got {})",
                self.longitude
            )));
        }
        if !self.accuracy.is_finite() || self.accuracy < 0.0 {
            return Err(LocusError::InvalidArgument(format!(
                "accuracy must be a finite, non-negative radius (got {})",
                self.accuracy
            )));
        }
        Ok(())
    }

    /// Great-circle distance to `other` in metres (haversine).
    #[must_use]
    pub fn distance_to(&self, other: &Self) -> f64 {
        let dlat = (other.latitude - self.latitude).to_radians();
        let dlon = (other.longitude - self.longitude).to_radians();
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();

        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_METERS * a.sqrt().min(1.0).asin()
    }
}

/// Error details carried by a failed [`LocationEvent`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "code": "PROVIDER_FAILED",
    "message": "Location provider failed: no fix"
}))]
pub struct ErrorInfo {
    /// Machine-readable error code.
    #[schema(example = "PROVIDER_FAILED")]
    pub code: String,

    /// Human-readable message.
    pub message: String,
}

impl From<&LocusError> for ErrorInfo {
    fn from(err: &LocusError) -> Self {
        Self {
            code: err.error_code().to_string(),
            message: err.to_string(),
        }
    }
}

/// Payload of a [`LocationEvent`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum EventPayload {
    /// An accepted location sample.
    Location(LocationSample),
    /// Why the cycle produced no sample.
    Error(ErrorInfo),
}

/// Envelope published to every subscriber.
///
/// Serializes as `{ "success": bool, "payload": LocationSample | ErrorInfo }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "success": true,
    "payload": {
        "latitude": 48.8584,
        "longitude": 2.2945,
        "accuracy": 12.5,
        "time": 1_736_912_400_000_i64
    }
}))]
pub struct LocationEvent {
    /// `true` when `payload` is a location sample.
    pub success: bool,

    /// The sample or the error details.
    pub payload: EventPayload,
}

impl LocationEvent {
    /// Event carrying an accepted sample.
    #[must_use]
    pub const fn location(sample: LocationSample) -> Self {
        Self {
            success: true,
            payload: EventPayload::Location(sample),
        }
    }

    /// Event carrying a failure.
    #[must_use]
    pub const fn failure(info: ErrorInfo) -> Self {
        Self {
            success: false,
            payload: EventPayload::Error(info),
        }
    }

    /// The sample, if this is a success event.
    #[must_use]
    pub const fn sample(&self) -> Option<&LocationSample> {
        match &self.payload {
            EventPayload::Location(sample) => Some(sample),
            EventPayload::Error(_) => None,
        }
    }
}
