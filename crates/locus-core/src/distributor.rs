//! In-process observer registry for location events.
//!
//! Subscribers register a callback and receive a [`Subscription`] handle.
//! [`EventDistributor::publish`] delivers each event synchronously to every
//! live subscriber in registration order. Delivery iterates over a snapshot of
//! the registry, so callbacks may subscribe or unsubscribe freely.
//!
//! A callback that returns an error or panics is logged and skipped; it keeps
//! its registration and the remaining subscribers are still notified.
//!
//! `publish` is serialized: a callback must not publish on the same
//! distributor from inside its own invocation.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::types::LocationEvent;

/// Error returned by a subscriber callback.
pub type SubscriberError = Box<dyn std::error::Error + Send + Sync>;

/// Result returned by a subscriber callback.
pub type SubscriberResult = std::result::Result<(), SubscriberError>;

type Callback = dyn Fn(&LocationEvent) -> SubscriberResult + Send + Sync;

/// Opaque identifier of one registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct SubscriptionId(Uuid);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Handle to a live registration, owned by the subscriber.
///
/// Pass it to [`EventDistributor::unsubscribe`] to stop deliveries. Dropping
/// the handle without unsubscribing leaves the registration in place.
#[derive(Debug, PartialEq, Eq)]
#[must_use = "dropping the handle makes the subscription impossible to remove"]
pub struct Subscription {
    id: SubscriptionId,
}

impl Subscription {
    /// Identifier of this registration.
    #[must_use]
    pub const fn id(&self) -> SubscriptionId {
        self.id
    }
}

struct Entry {
    id: SubscriptionId,
    active: Arc<AtomicBool>,
    callback: Arc<Callback>,
}

/// Result of one [`EventDistributor::publish`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Callbacks that completed successfully.
    pub delivered: usize,
    /// Callbacks that returned an error or panicked.
    pub failed: usize,
}

/// Fan-out of location events to registered callbacks.
#[derive(Default)]
pub struct EventDistributor {
    subscribers: RwLock<Vec<Entry>>,
    publish_lock: Mutex<()>,
    published: AtomicU64,
}

impl fmt::Debug for EventDistributor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventDistributor")
            .field("subscribers", &self.subscriber_count())
            .field("published", &self.published_count())
            .finish()
    }
}

impl EventDistributor {
    /// Create a distributor with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` for every subsequently published event.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&LocationEvent) -> SubscriberResult + Send + Sync + 'static,
    {
        let id = SubscriptionId(Uuid::new_v4());
        self.subscribers.write().push(Entry {
            id,
            active: Arc::new(AtomicBool::new(true)),
            callback: Arc::new(callback),
        });
        debug!(subscription = %id, "Subscriber registered");
        Subscription { id }
    }

    /// Remove the registration behind `handle`.
    ///
    /// Returns `false` when the registration was already removed, so a
    /// repeated call is a no-op.
    pub fn unsubscribe(&self, handle: &Subscription) -> bool {
        let mut subscribers = self.subscribers.write();
        let Some(index) = subscribers.iter().position(|e| e.id == handle.id) else {
            return false;
        };
        let entry = subscribers.remove(index);
        entry.active.store(false, Ordering::Release);
        debug!(subscription = %handle.id, "Subscriber removed");
        true
    }

    /// Remove every registration.
    pub fn clear(&self) {
        let removed: Vec<Entry> = std::mem::take(&mut *self.subscribers.write());
        for entry in &removed {
            entry.active.store(false, Ordering::Release);
        }
        debug!(count = removed.len(), "All subscribers removed");
    }

    /// Deliver `event` to every live subscriber.
    pub fn publish(&self, event: &LocationEvent) -> DeliveryReport {
        let _serial = self.publish_lock.lock();

        let snapshot: Vec<(SubscriptionId, Arc<AtomicBool>, Arc<Callback>)> = self
            .subscribers
            .read()
            .iter()
            .map(|e| (e.id, Arc::clone(&e.active), Arc::clone(&e.callback)))
            .collect();

        let mut report = DeliveryReport::default();
        for (id, active, callback) in snapshot {
            // Removed after the snapshot was taken.
            if !active.load(Ordering::Acquire) {
                continue;
            }
            match catch_unwind(AssertUnwindSafe(|| callback(event))) {
                Ok(Ok(())) => report.delivered += 1,
                Ok(Err(err)) => {
                    warn!(subscription = %id, error = %err, "Subscriber failed to handle location event");
                    report.failed += 1;
                }
                Err(_) => {
                    warn!(subscription = %id, "Subscriber panicked while handling location event");
                    report.failed += 1;
                }
            }
        }

        self.published.fetch_add(1, Ordering::Relaxed);
        report
    }

    /// Number of live registrations.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Number of events published so far.
    #[must_use]
    pub fn published_count(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }
}
