//! The sampling engine.
//!
//! One background task per engine polls the [`LocationProvider`] every
//! `poll_interval_ms`, reading the effective configuration afresh on each
//! cycle. A candidate reading is accepted when
//!
//! - there is no previously accepted sample, or
//! - it lies at least `distance_filter_meters` from the last accepted sample, or
//! - at least `update_interval_ms` has passed since the last accepted sample.
//!
//! Accepted samples are appended to the [`HistoryBuffer`] and published on the
//! [`EventDistributor`] under one write lock, so manual submissions and the
//! loop never interleave. Rejected readings are dropped silently; readings
//! with non-finite or off-globe coordinates are dropped with a warning. Provider
//! failures are published as failure events and the loop carries on.
//!
//! The loop only runs while the [`PermissionGate`] reports `authorized`; if
//! access is revoked, it exits on its own.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use utoipa::ToSchema;

use crate::config::{ConfigurationStore, LocationConfiguration};
use crate::distributor::EventDistributor;
use crate::error::{LocusError, Result};
use crate::history::HistoryBuffer;
use crate::permission::{AuthorizationState, PermissionGate};
use crate::provider::LocationProvider;
use crate::types::{ErrorInfo, LocationEvent, LocationSample};

/// What happened to one candidate reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum Disposition {
    /// Stored and published.
    Accepted,
    /// Neither far enough nor late enough after the last accepted sample.
    Filtered,
    /// Older than the last accepted sample.
    OutOfOrder,
    /// Coordinates or accuracy not finite, or off the globe.
    Invalid,
    /// Arrived after sampling stopped or authorization was withdrawn.
    Discarded,
}

/// Returns `true` if `candidate` passes the movement or time filter.
#[must_use]
pub fn passes_filters(
    last: Option<&LocationSample>,
    candidate: &LocationSample,
    config: &LocationConfiguration,
) -> bool {
    let Some(last) = last else {
        return true;
    };

    let interval = i64::try_from(config.update_interval_ms).unwrap_or(i64::MAX);
    if candidate.time.saturating_sub(last.time) >= interval {
        return true;
    }

    last.distance_to(candidate) >= config.distance_filter_meters
}

/// Engine counters and run state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "running": true,
    "cycles": 120,
    "accepted": 14,
    "rejected": 104,
    "failures": 2
}))]
pub struct SamplingStatus {
    /// Whether the sampling loop is running.
    pub running: bool,
    /// Sampling cycles completed.
    pub cycles: u64,
    /// Readings accepted into history.
    pub accepted: u64,
    /// Readings dropped by the filters or the ordering check.
    pub rejected: u64,
    /// Cycles in which the provider failed.
    pub failures: u64,
}

#[derive(Debug, Default)]
struct Counters {
    cycles: AtomicU64,
    accepted: AtomicU64,
    rejected: AtomicU64,
    failures: AtomicU64,
}

struct Pipeline {
    config: Arc<ConfigurationStore>,
    history: Arc<HistoryBuffer>,
    distributor: Arc<EventDistributor>,
    permission: Arc<PermissionGate>,
    provider: Arc<dyn LocationProvider>,
    counters: Counters,
    // Held across filter check, append and publish so that history order
    // and delivery order agree with concurrent submissions.
    write: Mutex<()>,
}

impl Pipeline {
    /// `run` is the loop's liveness flag; readings from a loop that was
    /// stopped, or whose authorization was withdrawn, are discarded.
    fn still_wanted(&self, run: Option<&AtomicBool>) -> bool {
        let Some(live) = run else {
            return true;
        };
        if !live.load(Ordering::Acquire) {
            debug!("Sampling stopped, discarding in-flight reading");
            return false;
        }
        let state = self.permission.check();
        if !state.is_authorized() {
            debug!(state = %state, "Authorization withdrawn, discarding in-flight reading");
            return false;
        }
        true
    }

    fn process(
        &self,
        candidate: LocationSample,
        config: &LocationConfiguration,
        run: Option<&AtomicBool>,
    ) -> Disposition {
        if let Err(err) = candidate.validate() {
            self.counters.rejected.fetch_add(1, Ordering::Relaxed);
            warn!(time = candidate.time, error = %err, "Discarding invalid reading");
            return Disposition::Invalid;
        }

        let _write = self.write.lock();
        if !self.still_wanted(run) {
            return Disposition::Discarded;
        }

        let last = self.history.latest();
        if !passes_filters(last.as_ref(), &candidate, config) {
            self.counters.rejected.fetch_add(1, Ordering::Relaxed);
            debug!(time = candidate.time, "Reading below movement and time thresholds");
            return Disposition::Filtered;
        }

        if !self.history.append(candidate).is_accepted() {
            self.counters.rejected.fetch_add(1, Ordering::Relaxed);
            return Disposition::OutOfOrder;
        }

        self.counters.accepted.fetch_add(1, Ordering::Relaxed);
        self.distributor.publish(&LocationEvent::location(candidate));
        Disposition::Accepted
    }

    async fn cycle(
        &self,
        config: &LocationConfiguration,
        run: Option<&AtomicBool>,
    ) -> Option<Disposition> {
        self.counters.cycles.fetch_add(1, Ordering::Relaxed);
        match self.provider.read(config).await {
            Ok(Some(candidate)) => Some(self.process(candidate, config, run)),
            Ok(None) => {
                debug!(provider = self.provider.name(), "No fix this cycle");
                None
            }
            Err(err) => {
                self.counters.failures.fetch_add(1, Ordering::Relaxed);
                warn!(provider = self.provider.name(), error = %err, "Location provider failed");
                let _write = self.write.lock();
                if self.still_wanted(run) {
                    self.distributor
                        .publish(&LocationEvent::failure(ErrorInfo::from(&err)));
                }
                None
            }
        }
    }
}

struct Run {
    handle: JoinHandle<()>,
    live: Arc<AtomicBool>,
}

/// Drives a [`LocationProvider`] into the history and distributor.
pub struct SamplingEngine {
    pipeline: Arc<Pipeline>,
    task: Mutex<Option<Run>>,
}

impl std::fmt::Debug for SamplingEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SamplingEngine")
            .field("provider", &self.pipeline.provider.name())
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl SamplingEngine {
    /// Wire an engine to its collaborators. Nothing runs until [`start`](Self::start).
    pub fn new(
        config: Arc<ConfigurationStore>,
        history: Arc<HistoryBuffer>,
        distributor: Arc<EventDistributor>,
        permission: Arc<PermissionGate>,
        provider: Arc<dyn LocationProvider>,
    ) -> Self {
        Self {
            pipeline: Arc::new(Pipeline {
                config,
                history,
                distributor,
                permission,
                provider,
                counters: Counters::default(),
                write: Mutex::new(()),
            }),
            task: Mutex::new(None),
        }
    }

    /// Start the sampling loop. Must be called within a Tokio runtime.
    ///
    /// Calling `start` while the loop is running does nothing.
    ///
    /// # Errors
    ///
    /// Returns `LocusError::PermissionDenied` if location access is not authorized.
    pub fn start(&self) -> Result<()> {
        let state = self.pipeline.permission.check();
        if !state.is_authorized() {
            return Err(LocusError::PermissionDenied(state));
        }

        let mut task = self.task.lock();
        if task.as_ref().is_some_and(|run| !run.handle.is_finished()) {
            debug!("Sampling already running");
            return Ok(());
        }

        let pipeline = Arc::clone(&self.pipeline);
        let auth = self.pipeline.permission.watch();
        let live = Arc::new(AtomicBool::new(true));
        let handle = tokio::spawn(run_loop(pipeline, auth, Arc::clone(&live)));
        *task = Some(Run { handle, live });
        info!(provider = self.pipeline.provider.name(), "Sampling started");
        Ok(())
    }

    /// Stop the sampling loop. Returns `true` if it was running.
    ///
    /// Once this returns, the loop appends and publishes nothing more, even
    /// if a reading was in flight.
    pub fn stop(&self) -> bool {
        let Some(run) = self.task.lock().take() else {
            return false;
        };
        {
            let _write = self.pipeline.write.lock();
            run.live.store(false, Ordering::Release);
        }
        let was_running = !run.handle.is_finished();
        run.handle.abort();
        if was_running {
            info!("Sampling stopped");
        }
        was_running
    }

    /// Whether the sampling loop is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .is_some_and(|run| !run.handle.is_finished())
    }

    /// Run a single cycle on the caller's task, outside the loop.
    ///
    /// Returns the disposition of the reading, or `None` when the provider
    /// produced no reading.
    pub async fn sample_once(&self) -> Option<Disposition> {
        let config = self.pipeline.config.effective();
        self.pipeline.cycle(&config, None).await
    }

    /// Feed `candidate` through the validity check and the filters as if the
    /// provider had produced it.
    pub fn submit(&self, candidate: LocationSample) -> Disposition {
        let config = self.pipeline.config.effective();
        self.pipeline.process(candidate, &config, None)
    }

    /// Counters and run state.
    #[must_use]
    pub fn status(&self) -> SamplingStatus {
        let counters = &self.pipeline.counters;
        SamplingStatus {
            running: self.is_running(),
            cycles: counters.cycles.load(Ordering::Relaxed),
            accepted: counters.accepted.load(Ordering::Relaxed),
            rejected: counters.rejected.load(Ordering::Relaxed),
            failures: counters.failures.load(Ordering::Relaxed),
        }
    }
}

impl Drop for SamplingEngine {
    fn drop(&mut self) {
        if let Some(run) = self.task.get_mut().take() {
            run.live.store(false, Ordering::Release);
            run.handle.abort();
        }
    }
}

async fn run_loop(
    pipeline: Arc<Pipeline>,
    mut auth: watch::Receiver<AuthorizationState>,
    live: Arc<AtomicBool>,
) {
    loop {
        let state = *auth.borrow_and_update();
        if !state.is_authorized() {
            warn!(state = %state, "Location authorization lost, sampling stopped");
            break;
        }
        if !live.load(Ordering::Acquire) {
            break;
        }

        let config = pipeline.config.effective();
        pipeline.cycle(&config, Some(&*live)).await;

        tokio::select! {
            () = tokio::time::sleep(Duration::from_millis(config.poll_interval_ms)) => {}
            changed = auth.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PartialLocationConfiguration;
    use crate::permission::StaticConsent;
    use crate::provider::{ScriptedProvider, ScriptedReading};

    struct Rig<P = ScriptedProvider> {
        config: Arc<ConfigurationStore>,
        history: Arc<HistoryBuffer>,
        distributor: Arc<EventDistributor>,
        permission: Arc<PermissionGate>,
        provider: Arc<P>,
        engine: SamplingEngine,
    }

    fn rig(state: AuthorizationState, script: Vec<ScriptedReading>) -> Rig {
        rig_with(state, Arc::new(ScriptedProvider::new(script)))
    }

    fn rig_with<P: LocationProvider + 'static>(state: AuthorizationState, provider: Arc<P>) -> Rig<P> {
        let config = Arc::new(ConfigurationStore::new(LocationConfiguration {
            distance_filter_meters: 50.0,
            update_interval_ms: 60_000,
            poll_interval_ms: 5,
            ..LocationConfiguration::default()
        }));
        let history = Arc::new(HistoryBuffer::default());
        let distributor = Arc::new(EventDistributor::new());
        let permission = Arc::new(PermissionGate::new(
            state,
            Arc::new(StaticConsent(AuthorizationState::Authorized)),
        ));
        let engine = SamplingEngine::new(
            Arc::clone(&config),
            Arc::clone(&history),
            Arc::clone(&distributor),
            Arc::clone(&permission),
            provider.clone(),
        );
        Rig {
            config,
            history,
            distributor,
            permission,
            provider,
            engine,
        }
    }

    // Roughly 111 m per 0.001 degree of latitude.
    fn at(lat_millis: i32, time: i64) -> LocationSample {
        LocationSample::new(f64::from(lat_millis) / 1000.0, 0.0, 5.0, time)
    }

    /// Takes `delay` to answer; each answer lies 1 km further north.
    struct SlowProvider {
        delay: Duration,
        calls: AtomicU64,
    }

    impl SlowProvider {
        fn new(delay: Duration) -> Self {
            Self {
                delay,
                calls: AtomicU64::new(0),
            }
        }
    }

    #[async_trait::async_trait]
    impl LocationProvider for SlowProvider {
        async fn read(&self, _config: &LocationConfiguration) -> Result<Option<LocationSample>> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::time::sleep(self.delay).await;
            let step = i32::try_from(n).unwrap();
            Ok(Some(at(step * 10, i64::from(step))))
        }

        fn name(&self) -> &'static str {
            "slow"
        }
    }

    #[test]
    fn test_first_sample_always_passes() {
        let config = LocationConfiguration::default();
        assert!(passes_filters(None, &at(0, 0), &config));
    }

    #[test]
    fn test_filters_movement_or_time() {
        let config = LocationConfiguration {
            distance_filter_meters: 100.0,
            update_interval_ms: 1_000,
            ..LocationConfiguration::default()
        };
        let last = at(0, 0);
        // 1 m away, 500 ms later: rejected.
        let near = LocationSample::new(0.000_01, 0.0, 5.0, 500);
        assert!(!passes_filters(Some(&last), &near, &config));
        // 111 m away: accepted on movement.
        assert!(passes_filters(Some(&last), &at(1, 500), &config));
        // Same place, interval elapsed: accepted on time.
        assert!(passes_filters(Some(&last), &at(0, 1_000), &config));
    }

    #[test]
    fn test_submit_appends_and_publishes_accepted_samples_only() {
        let rig = rig(AuthorizationState::Authorized, Vec::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _sub = rig.distributor.subscribe(move |e| {
            if let Some(s) = e.sample() {
                sink.lock().push(s.time);
            }
            Ok(())
        });

        assert_eq!(rig.engine.submit(at(0, 100)), Disposition::Accepted);
        assert_eq!(rig.engine.submit(at(0, 200)), Disposition::Filtered);
        assert_eq!(rig.engine.submit(at(5, 300)), Disposition::Accepted);
        assert_eq!(rig.engine.submit(at(10, 250)), Disposition::OutOfOrder);

        assert_eq!(*seen.lock(), vec![100, 300]);
        assert_eq!(rig.history.len(), 2);
        let status = rig.engine.status();
        assert_eq!((status.accepted, status.rejected), (2, 2));
    }

    #[tokio::test]
    async fn test_start_without_authorization_fails_and_leaves_history_alone() {
        let rig = rig(AuthorizationState::Denied, vec![ScriptedReading::Fix(at(0, 1))]);

        let err = rig.engine.start().unwrap_err();
        assert!(matches!(
            err,
            LocusError::PermissionDenied(AuthorizationState::Denied)
        ));
        assert!(!rig.engine.is_running());
        assert!(rig.history.is_empty());
        assert_eq!(rig.provider.remaining(), 1);
    }

    #[tokio::test]
    async fn test_loop_samples_until_stopped() {
        let rig = rig(
            AuthorizationState::Authorized,
            vec![
                ScriptedReading::Fix(at(0, 1)),
                ScriptedReading::Fix(at(1, 2)),
                ScriptedReading::Fix(at(2, 3)),
            ],
        );

        rig.engine.start().unwrap();
        rig.engine.start().unwrap();
        assert!(rig.engine.is_running());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(rig.engine.stop());
        assert!(!rig.engine.is_running());
        assert!(!rig.engine.stop());

        let times: Vec<i64> = rig.history.snapshot().iter().map(|s| s.time).collect();
        assert_eq!(times, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_provider_failure_is_published_and_loop_survives() {
        let rig = rig(
            AuthorizationState::Authorized,
            vec![
                ScriptedReading::Failure("antenna unplugged".into()),
                ScriptedReading::Fix(at(0, 10)),
            ],
        );
        let failures = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&failures);
        let _sub = rig.distributor.subscribe(move |e| {
            if !e.success {
                counter.fetch_add(1, Ordering::SeqCst);
            }
            Ok(())
        });

        assert_eq!(rig.engine.sample_once().await, None);
        assert_eq!(rig.engine.sample_once().await, Some(Disposition::Accepted));
        assert_eq!(failures.load(Ordering::SeqCst), 1);
        assert_eq!(rig.engine.status().failures, 1);
        assert_eq!(rig.history.len(), 1);
    }

    #[tokio::test]
    async fn test_each_cycle_reads_fresh_configuration() {
        let rig = rig(AuthorizationState::Authorized, vec![ScriptedReading::NoFix; 2]);

        rig.engine.sample_once().await;
        assert_eq!(
            rig.provider.last_config().map(|c| c.distance_filter_meters),
            Some(50.0)
        );

        rig.config
            .set_temporary(&PartialLocationConfiguration {
                distance_filter_meters: Some(5.0),
                ..Default::default()
            })
            .unwrap();
        rig.engine.sample_once().await;
        assert_eq!(
            rig.provider.last_config().map(|c| c.distance_filter_meters),
            Some(5.0)
        );
    }

    #[tokio::test]
    async fn test_revocation_forces_stop() {
        let rig = rig(AuthorizationState::Authorized, Vec::new());
        rig.engine.start().unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        rig.permission.revoke();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(!rig.engine.is_running());
        assert!(matches!(
            rig.engine.start(),
            Err(LocusError::PermissionDenied(AuthorizationState::Denied))
        ));
    }

    #[tokio::test]
    async fn test_reading_in_flight_at_revocation_is_discarded() {
        let rig = rig_with(
            AuthorizationState::Authorized,
            Arc::new(SlowProvider::new(Duration::from_millis(100))),
        );
        rig.engine.start().unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        rig.permission.revoke();
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(rig.provider.calls.load(Ordering::SeqCst), 1);
        assert!(rig.history.is_empty());
        assert_eq!(rig.engine.status().accepted, 0);
        assert!(!rig.engine.is_running());
    }

    #[test]
    fn test_stopped_run_commits_nothing() {
        let rig = rig(AuthorizationState::Authorized, Vec::new());
        let config = rig.config.effective();
        let seen = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&seen);
        let _sub = rig.distributor.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let live = AtomicBool::new(false);
        assert_eq!(
            rig.engine.pipeline.process(at(0, 1), &config, Some(&live)),
            Disposition::Discarded
        );
        live.store(true, Ordering::SeqCst);
        rig.permission.revoke();
        assert_eq!(
            rig.engine.pipeline.process(at(0, 2), &config, Some(&live)),
            Disposition::Discarded
        );

        assert!(rig.history.is_empty());
        assert_eq!(seen.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_invalid_readings_are_rejected() {
        let rig = rig(AuthorizationState::Authorized, Vec::new());
        assert_eq!(rig.engine.submit(at(0, 1)), Disposition::Accepted);
        assert_eq!(
            rig.engine.submit(LocationSample::new(f64::NAN, 1.0, 5.0, 70_000)),
            Disposition::Invalid
        );
        assert_eq!(
            rig.engine.submit(LocationSample::new(1.0, 200.0, 5.0, 80_000)),
            Disposition::Invalid
        );

        assert_eq!(rig.history.len(), 1);
        assert_eq!(rig.engine.status().rejected, 2);
    }

    #[test]
    fn test_concurrent_submissions_see_each_other() {
        // Both candidates are far from the tail but on top of each other, so
        // exactly one of them may be accepted.
        for _ in 0..200 {
            let rig = rig(AuthorizationState::Authorized, Vec::new());
            assert_eq!(rig.engine.submit(at(0, 0)), Disposition::Accepted);

            let published = Arc::new(Mutex::new(Vec::new()));
            let sink = Arc::clone(&published);
            let _sub = rig.distributor.subscribe(move |e| {
                if let Some(s) = e.sample() {
                    sink.lock().push(s.time);
                }
                Ok(())
            });

            let barrier = std::sync::Barrier::new(2);
            let outcomes: Vec<Disposition> = std::thread::scope(|scope| {
                let handles: Vec<_> = [10, 11]
                    .into_iter()
                    .map(|time| {
                        let (engine, barrier) = (&rig.engine, &barrier);
                        scope.spawn(move || {
                            barrier.wait();
                            engine.submit(at(100, time))
                        })
                    })
                    .collect();
                handles.into_iter().map(|h| h.join().unwrap()).collect()
            });

            let accepted = outcomes
                .iter()
                .filter(|d| **d == Disposition::Accepted)
                .count();
            assert_eq!(accepted, 1, "{outcomes:?}");

            let stored: Vec<i64> = rig.history.snapshot().iter().skip(1).map(|s| s.time).collect();
            assert_eq!(*published.lock(), stored);
        }
    }
}
