//! Counters for event bus delivery accounting

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Atomic delivery counters for a single bus instance
#[derive(Debug, Default)]
pub struct EventBusMetrics {
    published: AtomicU64,
    dropped: AtomicU64,
    failed: AtomicU64,
    subscribers: AtomicUsize,
}

/// Point-in-time consistent view of the counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub events_published: u64,
    pub events_dropped: u64,
    pub events_failed: u64,
    pub active_subscribers: usize,
}

impl MetricsSnapshot {
    /// Fraction of publishes that reached at least one subscriber
    #[must_use]
    pub fn success_rate(&self) -> f64 {
        if self.events_published == 0 {
            return 1.0;
        }
        let delivered = self.events_published.saturating_sub(self.events_dropped);
        delivered as f64 / self.events_published as f64
    }
}

impl EventBusMetrics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn increment_published(&self) {
        self.published.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn increment_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn increment_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn update_subscriber_count(&self, count: usize) {
        self.subscribers.store(count, Ordering::Relaxed);
    }

    #[must_use]
    pub fn get_published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn get_dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn get_failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            events_published: self.published.load(Ordering::Relaxed),
            events_dropped: self.dropped.load(Ordering::Relaxed),
            events_failed: self.failed.load(Ordering::Relaxed),
            active_subscribers: self.subscribers.load(Ordering::Relaxed),
        }
    }
}
