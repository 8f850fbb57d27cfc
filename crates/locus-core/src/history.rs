//! Bounded history of accepted location samples.
//!
//! The buffer keeps at most `capacity` samples, evicting the oldest on
//! overflow. Timestamps never decrease from head to tail: a sample older than
//! the current tail is dropped with a warning instead of being inserted.

use std::collections::VecDeque;

use parking_lot::RwLock;
use tracing::warn;

use crate::error::{LocusError, Result};
use crate::types::LocationSample;

/// Default number of samples retained.
pub const DEFAULT_HISTORY_CAPACITY: usize = 500;

/// Outcome of [`HistoryBuffer::append`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// The sample was stored.
    Appended,
    /// The sample was stored and the oldest sample was evicted to make room.
    AppendedWithEviction,
    /// The sample's timestamp is earlier than the tail; nothing was stored.
    RejectedOutOfOrder,
}

impl AppendOutcome {
    /// Returns `true` if the sample is now in the buffer.
    #[must_use]
    pub const fn is_accepted(self) -> bool {
        !matches!(self, Self::RejectedOutOfOrder)
    }
}

/// Capacity-bounded, chronologically ordered sample store.
#[derive(Debug)]
pub struct HistoryBuffer {
    samples: RwLock<VecDeque<LocationSample>>,
    capacity: usize,
}

impl HistoryBuffer {
    /// Create an empty buffer. A capacity of zero is raised to one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: RwLock::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity,
        }
    }

    /// Maximum number of retained samples.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append `sample` at the tail.
    pub fn append(&self, sample: LocationSample) -> AppendOutcome {
        let mut samples = self.samples.write();

        if let Some(tail) = samples.back() {
            if sample.time < tail.time {
                warn!(
                    sample_time = sample.time,
                    tail_time = tail.time,
                    "Dropping location sample older than history tail"
                );
                return AppendOutcome::RejectedOutOfOrder;
            }
        }

        let evicted = if samples.len() >= self.capacity {
            samples.pop_front();
            true
        } else {
            false
        };
        samples.push_back(sample);

        if evicted {
            AppendOutcome::AppendedWithEviction
        } else {
            AppendOutcome::Appended
        }
    }

    /// The `n` most recent samples, oldest first.
    ///
    /// Returns fewer than `n` samples if the history is shorter.
    ///
    /// # Errors
    ///
    /// Returns `LocusError::InvalidArgument` if `n` is zero.
    pub fn last(&self, n: usize) -> Result<Vec<LocationSample>> {
        if n == 0 {
            return Err(LocusError::InvalidArgument(
                "number of locations must be greater than 0".to_string(),
            ));
        }
        let samples = self.samples.read();
        let skip = samples.len().saturating_sub(n);
        Ok(samples.iter().skip(skip).copied().collect())
    }

    /// The most recent sample, if any.
    #[must_use]
    pub fn latest(&self) -> Option<LocationSample> {
        self.samples.read().back().copied()
    }

    /// Every retained sample, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<LocationSample> {
        self.samples.read().iter().copied().collect()
    }

    /// Number of retained samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.read().len()
    }

    /// Returns `true` if no sample is retained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.read().is_empty()
    }
}

impl Default for HistoryBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}
