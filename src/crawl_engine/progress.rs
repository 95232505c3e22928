//! Progress reporting for crawl lifecycle events
//!
//! The `ProgressReporter` trait decouples the loop from its observers: a
//! no-op implementation for embedding, and a throttled bus-backed one
//! that emits at most one progress event per interval or per N fetches,
//! whichever fires first.

use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::events::{CrawlEvent, CrawlStatus, EventBus};

/// Lifecycle reporting hooks for the crawl loop
pub trait ProgressReporter: Send + Sync {
    /// One init stage finished (status: started/completed/skipped/failed)
    fn report_init_stage(&self, stage: &str, status: &str, duration_ms: u64, message: Option<&str>);

    /// Called after every processed entry; implementations throttle
    fn report_fetch_progress(&self, visited: u64, queued: u64, message: &str);

    fn report_completed(&self, status: CrawlStatus);

    fn report_error(&self, error: &str);
}

/// Reporter that does nothing
#[derive(Debug, Clone, Copy)]
pub struct NoOpProgress;

impl ProgressReporter for NoOpProgress {
    #[inline(always)]
    fn report_init_stage(&self, _: &str, _: &str, _: u64, _: Option<&str>) {}

    #[inline(always)]
    fn report_fetch_progress(&self, _: u64, _: u64, _: &str) {}

    #[inline(always)]
    fn report_completed(&self, _: CrawlStatus) {}

    #[inline(always)]
    fn report_error(&self, _: &str) {}
}

/// Bus-backed reporter with interval / every-N throttling
pub struct ThrottledBusProgress {
    bus: Arc<EventBus>,
    interval: Duration,
    every_fetches: u64,
    last_emit: Mutex<Instant>,
    since_last: AtomicU64,
}

impl ThrottledBusProgress {
    #[must_use]
    pub fn new(bus: Arc<EventBus>, interval: Duration, every_fetches: u64) -> Self {
        Self {
            bus,
            interval,
            every_fetches: every_fetches.max(1),
            last_emit: Mutex::new(Instant::now()),
            since_last: AtomicU64::new(0),
        }
    }
}

impl ProgressReporter for ThrottledBusProgress {
    fn report_init_stage(&self, stage: &str, status: &str, duration_ms: u64, message: Option<&str>) {
        self.bus.publish(CrawlEvent::init_stage(
            stage,
            status,
            duration_ms,
            message.map(str::to_string),
        ));
    }

    fn report_fetch_progress(&self, visited: u64, queued: u64, message: &str) {
        let count = self.since_last.fetch_add(1, Ordering::Relaxed) + 1;
        let due_by_count = count >= self.every_fetches;

        let mut last = self.last_emit.lock();
        let due_by_time = last.elapsed() >= self.interval;
        if !due_by_count && !due_by_time {
            return;
        }
        *last = Instant::now();
        drop(last);
        self.since_last.store(0, Ordering::Relaxed);

        let total = visited + queued;
        let percent = if total == 0 {
            0.0
        } else {
            (visited as f64 / total as f64) * 100.0
        };
        self.bus.publish(CrawlEvent::progress(
            percent,
            visited,
            total,
            message.to_string(),
        ));
    }

    fn report_completed(&self, status: CrawlStatus) {
        log::info!("crawl finished: {}", status.as_str());
    }

    fn report_error(&self, error: &str) {
        log::warn!("crawl progress error: {error}");
    }
}
