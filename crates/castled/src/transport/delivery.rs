//! Acknowledgement accounting for at-least-once publishes.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct DeliveryCounts {
    queued: u64,
    acknowledged: u64,
}

/// Counts queued publishes against broker acknowledgements.
///
/// Lets shutdown wait, for a bounded interval, until the broker has confirmed
/// every message queued so far.
#[derive(Debug, Default)]
pub struct DeliveryTracker {
    counts: Mutex<DeliveryCounts>,
    changed: Condvar,
}

impl DeliveryTracker {
    /// Creates a tracker with no outstanding messages.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a message about to be handed to the session.
    ///
    /// Call before queueing so an acknowledgement can never be counted ahead
    /// of its message.
    pub fn record_queued(&self) {
        let mut counts = self.lock();
        counts.queued = counts.queued.saturating_add(1);
    }

    /// Withdraws a message the session refused to queue.
    pub fn record_abandoned(&self) {
        let mut counts = self.lock();
        counts.queued = counts.queued.saturating_sub(1);
        drop(counts);
        self.changed.notify_all();
    }

    /// Records a broker acknowledgement.
    pub fn record_acknowledged(&self) {
        let mut counts = self.lock();
        counts.acknowledged = counts.acknowledged.saturating_add(1);
        drop(counts);
        self.changed.notify_all();
    }

    /// Messages queued but not yet acknowledged.
    #[must_use]
    pub fn outstanding(&self) -> u64 {
        let counts = self.lock();
        counts.queued.saturating_sub(counts.acknowledged)
    }

    /// Waits until everything queued before the call is acknowledged.
    ///
    /// Returns `false` when `timeout` elapses first.
    pub fn wait_for_all(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut counts = self.lock();
        let target = counts.queued;
        while counts.acknowledged < target {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _) = self
                .changed
                .wait_timeout(counts, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            counts = guard;
        }
        true
    }

    fn lock(&self) -> MutexGuard<'_, DeliveryCounts> {
        self.counts.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
