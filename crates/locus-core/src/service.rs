//! The location service.
//!
//! [`LocationService`] owns one instance of every component and exposes the
//! public operations. There is no process-wide instance: callers create a
//! service, hold the returned `Arc`, and drive its lifecycle explicitly.
//!
//! ```text
//! create ──► start ──► stop ──► start ... ──► dispose
//!              │
//!              └── authorization revoked ──► stopped
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::{
    ConfigurationSnapshot, ConfigurationStore, LocationConfiguration,
    PartialLocationConfiguration,
};
use crate::distributor::{EventDistributor, SubscriberResult, Subscription};
use crate::error::{LocusError, Result};
use crate::history::HistoryBuffer;
use crate::permission::{AuthorizationState, ConsentPrompt, PermissionGate};
use crate::provider::LocationProvider;
use crate::sampling::{Disposition, SamplingEngine, SamplingStatus};
use crate::settings::Settings;
use crate::storage::HistoryStore;
use crate::types::{LocationEvent, LocationSample};
use crate::watcher::LocationWatcher;

/// Location sampling, history and update distribution behind one handle.
#[derive(Debug)]
pub struct LocationService {
    config: Arc<ConfigurationStore>,
    history: Arc<HistoryBuffer>,
    distributor: Arc<EventDistributor>,
    permission: Arc<PermissionGate>,
    engine: SamplingEngine,
    store: Option<HistoryStore>,
    disposed: AtomicBool,
}

impl LocationService {
    /// Build a service from `settings`, reading locations from `provider` and
    /// asking `consent` when authorization is requested.
    ///
    /// When history persistence is enabled the saved snapshot is loaded; a
    /// missing or unreadable snapshot starts the history empty.
    ///
    /// # Errors
    ///
    /// Returns `LocusError::ConfigParseError` if `settings` are invalid.
    pub fn create(
        settings: &Settings,
        provider: Arc<dyn LocationProvider>,
        consent: Arc<dyn ConsentPrompt>,
    ) -> Result<Arc<Self>> {
        settings.validate()?;

        let config = Arc::new(ConfigurationStore::new(settings.location_defaults()));
        let history = Arc::new(HistoryBuffer::new(settings.history.capacity));
        let distributor = Arc::new(EventDistributor::new());
        let permission = Arc::new(PermissionGate::new(settings.authorization.initial, consent));

        let store = settings
            .history
            .persist
            .then(|| HistoryStore::new(settings.history.data_dir.clone()));
        if let Some(store) = &store {
            restore_history(store, &history);
        }

        let engine = SamplingEngine::new(
            Arc::clone(&config),
            Arc::clone(&history),
            Arc::clone(&distributor),
            Arc::clone(&permission),
            provider,
        );

        info!(
            capacity = history.capacity(),
            restored = history.len(),
            persist = store.is_some(),
            authorization = %permission.check(),
            "Location service created"
        );

        Ok(Arc::new(Self {
            config,
            history,
            distributor,
            permission,
            engine,
            store,
            disposed: AtomicBool::new(false),
        }))
    }

    /// Build a service with the provider and consent flow named in `settings`.
    ///
    /// # Errors
    ///
    /// See [`LocationService::create`].
    pub fn from_settings(settings: &Settings) -> Result<Arc<Self>> {
        Self::create(
            settings,
            settings.provider.build(),
            settings.authorization.consent_prompt(),
        )
    }

    // =========================================================================
    // CONFIGURATION
    // =========================================================================

    /// Merge `partial` over the base configuration.
    ///
    /// # Errors
    ///
    /// Returns `LocusError::InvalidArgument` if a field is out of range.
    pub fn configure(&self, partial: &PartialLocationConfiguration) -> Result<()> {
        self.config.set_base(partial)
    }

    /// Install `partial`, merged over the base configuration, as the
    /// temporary override.
    ///
    /// # Errors
    ///
    /// Returns `LocusError::InvalidArgument` if a field is out of range.
    pub fn set_temporary_configuration(&self, partial: &PartialLocationConfiguration) -> Result<()> {
        self.config.set_temporary(partial)
    }

    /// Drop the temporary override. Returns `true` if one was installed.
    pub fn revert_temporary_configuration(&self) -> bool {
        self.config.revert_temporary()
    }

    /// The configuration the next sampling cycle will use.
    #[must_use]
    pub fn effective_configuration(&self) -> LocationConfiguration {
        self.config.effective()
    }

    /// Base and temporary configuration, read together.
    #[must_use]
    pub fn configuration_snapshot(&self) -> ConfigurationSnapshot {
        self.config.snapshot()
    }

    // =========================================================================
    // HISTORY
    // =========================================================================

    /// The `n` most recent samples, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `LocusError::InvalidArgument` if `n <= 0`.
    pub fn get_last_locations(&self, n: i64) -> Result<Vec<LocationSample>> {
        if n <= 0 {
            return Err(LocusError::InvalidArgument(format!(
                "n must be greater than 0 (got {n})"
            )));
        }
        self.history.last(usize::try_from(n).unwrap_or(usize::MAX))
    }

    /// Feed a reading through the filters as if the provider had produced it.
    ///
    /// # Errors
    ///
    /// Returns `LocusError::ServiceDisposed` after [`dispose`](Self::dispose),
    /// `LocusError::InvalidArgument` if the sample is not a valid fix, or
    /// `LocusError::PermissionDenied` if location access is not authorized.
    pub fn submit_sample(&self, sample: LocationSample) -> Result<Disposition> {
        self.ensure_live()?;
        sample.validate()?;
        let state = self.permission.check();
        if !state.is_authorized() {
            return Err(LocusError::PermissionDenied(state));
        }
        Ok(self.engine.submit(sample))
    }

    /// Save the history snapshot now. Does nothing when persistence is off.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be written.
    pub fn persist(&self) -> Result<()> {
        match &self.store {
            Some(store) => store.save(&self.history.snapshot()),
            None => Ok(()),
        }
    }

    // =========================================================================
    // AUTHORIZATION
    // =========================================================================

    /// Current authorization state.
    #[must_use]
    pub fn check_authorization(&self) -> AuthorizationState {
        self.permission.check()
    }

    /// Run the consent flow if the state is still `notDetermined`.
    pub async fn request_authorization(&self) -> AuthorizationState {
        self.permission.request().await
    }

    /// Record that location access was withdrawn. A running loop stops.
    pub fn revoke_authorization(&self) {
        self.permission.revoke();
    }

    // =========================================================================
    // SUBSCRIPTIONS
    // =========================================================================

    /// Receive every event published after this call.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&LocationEvent) -> SubscriberResult + Send + Sync + 'static,
    {
        self.distributor.subscribe(callback)
    }

    /// Cancel a subscription. Returns `false` if it was already cancelled.
    pub fn unsubscribe(&self, subscription: &Subscription) -> bool {
        self.distributor.unsubscribe(subscription)
    }

    /// Last-known-value view seeded from the newest history entry.
    #[must_use]
    pub fn watch_location(&self) -> LocationWatcher {
        LocationWatcher::new(Arc::clone(&self.distributor), self.history.latest())
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.distributor.subscriber_count()
    }

    // =========================================================================
    // LIFECYCLE
    // =========================================================================

    /// Start sampling. Must be called within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `LocusError::ServiceDisposed` after [`dispose`](Self::dispose),
    /// or `LocusError::PermissionDenied` if location access is not authorized.
    pub fn start(&self) -> Result<()> {
        self.ensure_live()?;
        self.engine.start()
    }

    /// Stop sampling and save the history. Returns `true` if it was running.
    pub fn stop(&self) -> bool {
        let was_running = self.engine.stop();
        if let Err(e) = self.persist() {
            warn!(error = %e, "Failed to save location history");
        }
        was_running
    }

    /// Stop sampling, save the history and drop every subscription.
    ///
    /// The service cannot be started again. Calling `dispose` twice is harmless.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.stop();
        self.distributor.clear();
        info!("Location service disposed");
    }

    /// Whether the sampling loop is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.engine.is_running()
    }

    /// Whether [`dispose`](Self::dispose) has been called.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Sampling counters and run state.
    #[must_use]
    pub fn sampling_status(&self) -> SamplingStatus {
        self.engine.status()
    }

    fn ensure_live(&self) -> Result<()> {
        if self.is_disposed() {
            return Err(LocusError::ServiceDisposed);
        }
        Ok(())
    }
}

fn restore_history(store: &HistoryStore, history: &HistoryBuffer) {
    match store.load() {
        Ok(samples) => {
            let mut dropped = 0_usize;
            for sample in samples {
                if !history.append(sample).is_accepted() {
                    dropped += 1;
                }
            }
            if dropped > 0 {
                warn!(dropped, "Dropped out-of-order samples from saved history");
            }
        }
        Err(e) => {
            warn!(
                path = %store.snapshot_path().display(),
                error = %e,
                "Could not load saved history, starting empty"
            );
        }
    }
}
