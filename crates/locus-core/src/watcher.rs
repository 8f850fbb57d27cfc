//! Last-known-value view over the event distributor.
//!
//! A [`LocationWatcher`] always holds one sample: the most recent accepted
//! sample it has seen, the newest entry in history when it was created, or
//! [`LocationSample::unknown`] if there was none. Failure events leave the
//! value untouched.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;

use crate::distributor::{EventDistributor, Subscription};
use crate::types::LocationSample;

/// Tracks the latest accepted location.
///
/// Dropping the watcher unsubscribes it.
#[derive(Debug)]
pub struct LocationWatcher {
    distributor: Arc<EventDistributor>,
    subscription: Mutex<Option<Subscription>>,
    rx: watch::Receiver<LocationSample>,
}

impl LocationWatcher {
    /// Subscribe to `distributor`, starting from `seed` (or the sentinel).
    pub fn new(distributor: Arc<EventDistributor>, seed: Option<LocationSample>) -> Self {
        let (tx, rx) = watch::channel(seed.unwrap_or_else(LocationSample::unknown));
        let subscription = distributor.subscribe(move |event| {
            if let Some(sample) = event.sample() {
                tx.send_replace(*sample);
            }
            Ok(())
        });
        Self {
            distributor,
            subscription: Mutex::new(Some(subscription)),
            rx,
        }
    }

    /// The latest known sample.
    #[must_use]
    pub fn current(&self) -> LocationSample {
        *self.rx.borrow()
    }

    /// Wait for the next accepted sample and return it.
    ///
    /// Returns `None` once the watcher is closed.
    pub async fn changed(&mut self) -> Option<LocationSample> {
        self.rx.changed().await.ok()?;
        Some(*self.rx.borrow_and_update())
    }

    /// Stop receiving updates. The last value stays readable.
    pub fn close(&self) {
        if let Some(subscription) = self.subscription.lock().take() {
            self.distributor.unsubscribe(&subscription);
        }
    }

    /// Whether the watcher still receives updates.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.subscription.lock().is_some()
    }
}

impl Drop for LocationWatcher {
    fn drop(&mut self) {
        self.close();
    }
}
