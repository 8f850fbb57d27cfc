//! # locus-core
//!
//! Core logic for the locus location service.
//!
//! This crate provides:
//! - A configuration store with a base configuration and a temporary override
//! - A sampling engine that polls a pluggable location provider and keeps
//!   only readings that moved far enough or arrived late enough
//! - A bounded, chronologically ordered history of accepted samples
//! - An event distributor delivering every accepted sample to subscribers
//! - An authorization gate that sampling depends on
//!
//! ## Architecture
//!
//! The crate is organized into the following modules:
//!
//! - [`config`] - Location configuration, partial updates and the configuration store
//! - [`history`] - Capacity-bounded sample history
//! - [`sampling`] - Sampling loop and acceptance filters
//! - [`provider`] - Location provider trait with scripted and simulated sources
//! - [`distributor`] - Subscriber registry and event publication
//! - [`permission`] - Authorization state and the consent flow
//! - [`watcher`] - Last-known-location view over the distributor
//! - [`service`] - The service object tying everything together
//! - [`settings`] - Service settings loaded from TOML and the environment
//! - [`storage`] - History snapshots on disk
//! - [`error`] - Unified error types for the crate
//! - [`types`] - Location samples, events and OpenAPI schemas

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![warn(missing_docs)]

pub mod config;
pub mod distributor;
pub mod error;
pub mod history;
pub mod permission;
pub mod provider;
pub mod sampling;
pub mod service;
pub mod settings;
pub mod storage;
pub mod types;
pub mod watcher;

// Re-export primary types for convenience
pub use config::{
    ConfigurationSnapshot, ConfigurationStore, DesiredAccuracy, LocationConfiguration,
    PartialLocationConfiguration,
};
pub use distributor::{
    DeliveryReport, EventDistributor, SubscriberError, SubscriberResult, Subscription,
    SubscriptionId,
};
pub use error::{LocusError, Result};
pub use history::{AppendOutcome, HistoryBuffer, DEFAULT_HISTORY_CAPACITY};
pub use permission::{AuthorizationState, ConsentPrompt, PermissionGate, StaticConsent};
pub use provider::{
    LocationProvider, ScriptedProvider, ScriptedReading, SimulatedProvider, SimulationSettings,
};
pub use sampling::{passes_filters, Disposition, SamplingEngine, SamplingStatus};
pub use service::LocationService;
pub use settings::{
    AuthorizationSettings, HistorySettings, ProviderKind, ProviderSettings, ServerSettings,
    Settings,
};
pub use storage::{default_data_dir, HistoryStore};
pub use types::{ErrorInfo, EventPayload, LocationEvent, LocationSample};
pub use watcher::LocationWatcher;
