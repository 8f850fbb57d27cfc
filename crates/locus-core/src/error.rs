//! Unified error types for the locus core library.
//!
//! This module provides a unified error type [`LocusError`] that covers all failure
//! modes surfaced by the locus service. Conditions that are deliberately *not*
//! surfaced (a candidate reading rejected by the sampling filters, a sample whose
//! timestamp regresses, a subscriber failing inside its own callback) never become
//! a `LocusError`; they are counted and logged where they happen.
//!
//! # Design Principles
//!
//! - **Specific variants**: Each error variant captures exactly one failure mode
//! - **Actionable messages**: Error messages guide users toward resolution
//! - **HTTP-ready**: Error types include HTTP status codes and error codes
//!
//! # Example
//!
//! ```rust
//! use locus_core::error::{LocusError, Result};
//!
//! fn window(n: i64) -> Result<usize> {
//!     usize::try_from(n)
//!         .ok()
//!         .filter(|n| *n > 0)
//!         .ok_or_else(|| LocusError::InvalidArgument(format!("n must be positive (got {n})")))
//! }
//!
//! assert!(window(0).is_err());
//! ```

use std::path::PathBuf;

use thiserror::Error;

use crate::permission::AuthorizationState;

/// The unified error type for all locus operations.
#[derive(Debug, Error)]
pub enum LocusError {
    // =========================================================================
    // SERVICE ERRORS
    // =========================================================================
    /// Sampling was requested while location access is not authorized.
    #[error("Location access is not authorized (state: {0}). Request authorization before starting.")]
    PermissionDenied(AuthorizationState),

    /// A caller supplied an out-of-domain parameter.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The service has been disposed and can no longer be started.
    #[error("Location service has been disposed")]
    ServiceDisposed,

    /// The location provider failed to produce a reading.
    #[error("Location provider failed: {0}")]
    ProviderFailed(String),

    // =========================================================================
    // CONFIGURATION ERRORS
    // =========================================================================
    /// The settings file was not found at the expected path.
    #[error("Settings file not found at: {}", .0.display())]
    ConfigNotFound(PathBuf),

    /// The settings file exists but could not be parsed or is invalid.
    #[error("Failed to parse settings: {0}")]
    ConfigParseError(String),

    // =========================================================================
    // PERSISTENCE & I/O ERRORS
    // =========================================================================
    /// An error occurred while persisting or reading history.
    #[error("Persistence error: {0}")]
    PersistenceError(String),

    /// A low-level I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// A specialized [`Result`] type for locus operations.
pub type Result<T> = std::result::Result<T, LocusError>;

impl LocusError {
    /// Returns `true` if the error was caused by the caller's input.
    #[inline]
    #[must_use]
    pub const fn is_caller_error(&self) -> bool {
        matches!(self, Self::InvalidArgument(_) | Self::PermissionDenied(_))
    }

    /// Returns `true` if this error is related to configuration.
    #[inline]
    #[must_use]
    pub const fn is_config_error(&self) -> bool {
        matches!(self, Self::ConfigNotFound(_) | Self::ConfigParseError(_))
    }

    /// Returns `true` if this error is related to I/O or persistence.
    #[inline]
    #[must_use]
    pub const fn is_io_error(&self) -> bool {
        matches!(self, Self::PersistenceError(_) | Self::IoError(_))
    }

    /// Returns `true` if a later attempt may succeed without intervention.
    ///
    /// Provider failures are confined to a single sampling cycle.
    #[inline]
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::ProviderFailed(_) | Self::InvalidArgument(_))
    }

    /// Returns an HTTP-appropriate status code for this error.
    #[inline]
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            // 400 Bad Request - malformed input
            Self::InvalidArgument(_) => 400,

            // 403 Forbidden - understood but refused
            Self::PermissionDenied(_) => 403,

            // 404 Not Found
            Self::ConfigNotFound(_) => 404,

            // 409 Conflict - lifecycle no longer allows the operation
            Self::ServiceDisposed => 409,

            // 422 Unprocessable Entity - semantic errors
            Self::ConfigParseError(_) => 422,

            // 500 Internal Server Error - server-side issues
            Self::PersistenceError(_) | Self::IoError(_) => 500,

            // 503 Service Unavailable - location source issues
            Self::ProviderFailed(_) => 503,
        }
    }

    /// Returns a machine-readable error code for API responses.
    #[inline]
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::PermissionDenied(_) => "PERMISSION_DENIED",
            Self::InvalidArgument(_) => "INVALID_ARGUMENT",
            Self::ServiceDisposed => "SERVICE_DISPOSED",
            Self::ProviderFailed(_) => "PROVIDER_FAILED",
            Self::ConfigNotFound(_) => "CONFIG_NOT_FOUND",
            Self::ConfigParseError(_) => "CONFIG_PARSE_ERROR",
            Self::PersistenceError(_) => "PERSISTENCE_ERROR",
            Self::IoError(_) => "IO_ERROR",
        }
    }
}

// =============================================================================
// CONVERSIONS FROM LIBRARY ERRORS
// =============================================================================

impl From<config::ConfigError> for LocusError {
    fn from(err: config::ConfigError) -> Self {
        match err {
            config::ConfigError::NotFound(key) => {
                Self::ConfigParseError(format!("missing setting: {key}"))
            }
            other => Self::ConfigParseError(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for LocusError {
    fn from(err: serde_json::Error) -> Self {
        Self::PersistenceError(err.to_string())
    }
}

impl From<toml::ser::Error> for LocusError {
    fn from(err: toml::ser::Error) -> Self {
        Self::ConfigParseError(err.to_string())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error as IoErr, ErrorKind};

    #[test]
    fn test_caller_error_classification() {
        assert!(LocusError::InvalidArgument("n".into()).is_caller_error());
        assert!(LocusError::PermissionDenied(AuthorizationState::Denied).is_caller_error());
        assert!(!LocusError::ServiceDisposed.is_caller_error());
    }

    #[test]
    fn test_config_error_classification() {
        assert!(LocusError::ConfigNotFound(PathBuf::from("/test")).is_config_error());
        assert!(LocusError::ConfigParseError("syntax error".into()).is_config_error());
        assert!(!LocusError::ProviderFailed("gpsd".into()).is_config_error());
    }

    #[test]
    fn test_io_error_classification() {
        assert!(LocusError::PersistenceError("disk full".into()).is_io_error());
        assert!(LocusError::IoError(IoErr::new(ErrorKind::NotFound, "test")).is_io_error());
        assert!(!LocusError::ServiceDisposed.is_io_error());
    }

    #[test]
    fn test_recoverable_errors() {
        assert!(LocusError::ProviderFailed("no fix".into()).is_recoverable());
        assert!(!LocusError::ServiceDisposed.is_recoverable());
    }

    #[test]
    fn test_http_status_codes() {
        assert_eq!(LocusError::InvalidArgument("n".into()).http_status_code(), 400);
        assert_eq!(
            LocusError::PermissionDenied(AuthorizationState::NotDetermined).http_status_code(),
            403
        );
        assert_eq!(LocusError::ServiceDisposed.http_status_code(), 409);
        assert_eq!(LocusError::ConfigParseError("e".into()).http_status_code(), 422);
        assert_eq!(LocusError::PersistenceError("e".into()).http_status_code(), 500);
        assert_eq!(LocusError::ProviderFailed("e".into()).http_status_code(), 503);
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            LocusError::PermissionDenied(AuthorizationState::Denied).error_code(),
            "PERMISSION_DENIED"
        );
        assert_eq!(
            LocusError::InvalidArgument("n".into()).error_code(),
            "INVALID_ARGUMENT"
        );
    }

    #[test]
    fn test_error_display_messages() {
        let err = LocusError::PermissionDenied(AuthorizationState::Denied);
        assert!(err.to_string().contains("denied"));

        let err = LocusError::InvalidArgument("n must be positive".into());
        assert!(err.to_string().contains("n must be positive"));
    }

    #[test]
    fn test_from_io_error() {
        let io_err = IoErr::new(ErrorKind::NotFound, "file not found");
        let err: LocusError = io_err.into();
        assert!(matches!(err, LocusError::IoError(_)));
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<LocusError>();
        assert_sync::<LocusError>();
    }
}
