//! Bus delivery counters.
//!
//! Lock-free atomics updated on the hot path, snapshot on demand for
//! the engine's run report and the CLI summary.

use std::sync::atomic::{AtomicU64, Ordering};

/// Shared counters for one bus instance.
#[derive(Debug, Default)]
pub struct BusMetrics {
    published: AtomicU64,
    delivered: AtomicU64,
    no_subscriber: AtomicU64,
    translation_failures: AtomicU64,
    overflow_dropped: AtomicU64,
    publisher_suspensions: AtomicU64,
    dropped_at_shutdown: AtomicU64,
}

/// A point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    /// Publish calls accepted by the bus.
    pub published: u64,
    /// Envelopes enqueued into subscriber mailboxes.
    pub delivered: u64,
    /// Publishes dropped because the topic had no subscribers.
    pub no_subscriber: u64,
    /// Deliveries skipped because translation failed.
    pub translation_failures: u64,
    /// Envelopes dropped by `drop_oldest` / `drop_new` overflow.
    pub overflow_dropped: u64,
    /// Times a publisher suspended on a full mailbox under `block`.
    pub publisher_suspensions: u64,
    /// Envelopes discarded from mailboxes at shutdown.
    pub dropped_at_shutdown: u64,
}

impl BusMetrics {
    /// Creates zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_published(&self) {
        self.published.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_no_subscriber(&self) {
        self.no_subscriber.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_translation_failure(&self) {
        self.translation_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_overflow_dropped(&self) {
        self.overflow_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_publisher_suspension(&self) {
        self.publisher_suspensions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped_at_shutdown(&self, count: u64) {
        self.dropped_at_shutdown.fetch_add(count, Ordering::Relaxed);
    }

    /// Takes a point-in-time snapshot.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            published: self.published.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            no_subscriber: self.no_subscriber.load(Ordering::Relaxed),
            translation_failures: self.translation_failures.load(Ordering::Relaxed),
            overflow_dropped: self.overflow_dropped.load(Ordering::Relaxed),
            publisher_suspensions: self.publisher_suspensions.load(Ordering::Relaxed),
            dropped_at_shutdown: self.dropped_at_shutdown.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let metrics = BusMetrics::new();
        metrics.record_published();
        metrics.record_published();
        metrics.record_delivered();
        metrics.record_translation_failure();
        metrics.record_publisher_suspension();
        metrics.record_dropped_at_shutdown(3);

        let snap = metrics.snapshot();
        assert_eq!(snap.published, 2);
        assert_eq!(snap.delivered, 1);
        assert_eq!(snap.translation_failures, 1);
        assert_eq!(snap.publisher_suspensions, 1);
        assert_eq!(snap.dropped_at_shutdown, 3);
        assert_eq!(snap.overflow_dropped, 0);
    }
}
