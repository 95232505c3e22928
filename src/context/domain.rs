//! Per-host crawl state
//!
//! One `DomainState` per host, created lazily on first contact and kept
//! for the lifetime of the job. Request/error windows feed the retry
//! coordinator's throttle and lockout decisions.

use serde::Serialize;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Whether a host may be fetched right now
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomainAvailability {
    Available,
    /// Deferred until the throttle expires
    Throttled { remaining: Duration },
    /// Locked out; skip until expiry (or for the rest of the job)
    Blocked,
}

#[derive(Debug)]
pub(crate) struct BlockState {
    pub reason: String,
    /// None blocks for the remainder of the job
    pub until: Option<Instant>,
}

/// Mutable per-host record; guarded by the registry's per-entry lock
#[derive(Debug)]
pub struct DomainState {
    pub(crate) host: String,
    pub(crate) requests_in_window: u32,
    pub(crate) window_start: Instant,
    pub(crate) last_request_at: Option<Instant>,
    pub(crate) error_timestamps: VecDeque<Instant>,
    pub(crate) throttled_until: Option<Instant>,
    pub(crate) block: Option<BlockState>,
    pub(crate) total_requests: u64,
    pub(crate) total_errors: u64,
}

/// Serializable view for `CrawlContext::to_json`
#[derive(Debug, Clone, Serialize)]
pub struct DomainSnapshot {
    pub host: String,
    pub requests_in_window: u32,
    pub recent_errors: usize,
    pub throttled: bool,
    pub blocked: bool,
    pub block_reason: Option<String>,
    pub total_requests: u64,
    pub total_errors: u64,
}

impl DomainState {
    pub(crate) fn new(host: &str) -> Self {
        Self {
            host: host.to_string(),
            requests_in_window: 0,
            window_start: Instant::now(),
            last_request_at: None,
            error_timestamps: VecDeque::new(),
            throttled_until: None,
            block: None,
            total_requests: 0,
            total_errors: 0,
        }
    }

    pub(crate) fn record_request(&mut self, window: Duration) {
        let now = Instant::now();
        if now.duration_since(self.window_start) >= window {
            self.window_start = now;
            self.requests_in_window = 0;
        }
        self.requests_in_window += 1;
        self.total_requests += 1;
        self.last_request_at = Some(now);
    }

    /// Record an error; returns the number of errors still inside `window`
    pub(crate) fn record_error(&mut self, window: Duration) -> usize {
        let now = Instant::now();
        self.error_timestamps.push_back(now);
        self.total_errors += 1;
        self.prune_errors(now, window);
        self.error_timestamps.len()
    }

    /// A success ages out one error, in addition to time-based pruning
    pub(crate) fn record_success(&mut self, window: Duration) {
        let now = Instant::now();
        self.prune_errors(now, window);
        self.error_timestamps.pop_front();
    }

    fn prune_errors(&mut self, now: Instant, window: Duration) {
        while let Some(front) = self.error_timestamps.front() {
            if now.duration_since(*front) >= window {
                self.error_timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    pub(crate) fn errors_in_window(&mut self, window: Duration) -> usize {
        self.prune_errors(Instant::now(), window);
        self.error_timestamps.len()
    }

    /// Availability with lazy expiry of stale throttles and lockouts
    pub(crate) fn availability(&mut self) -> DomainAvailability {
        let now = Instant::now();
        if let Some(block) = &self.block {
            match block.until {
                Some(until) if now >= until => {
                    self.block = None;
                }
                _ => return DomainAvailability::Blocked,
            }
        }
        if let Some(until) = self.throttled_until {
            if now >= until {
                self.throttled_until = None;
            } else {
                return DomainAvailability::Throttled {
                    remaining: until.duration_since(now),
                };
            }
        }
        DomainAvailability::Available
    }

    #[must_use]
    pub(crate) fn is_blocked(&self) -> bool {
        match &self.block {
            Some(block) => match block.until {
                Some(until) => Instant::now() < until,
                None => true,
            },
            None => false,
        }
    }

    pub(crate) fn snapshot(&self) -> DomainSnapshot {
        DomainSnapshot {
            host: self.host.clone(),
            requests_in_window: self.requests_in_window,
            recent_errors: self.error_timestamps.len(),
            throttled: self
                .throttled_until
                .is_some_and(|until| Instant::now() < until),
            blocked: self.is_blocked(),
            block_reason: self.block.as_ref().map(|b| b.reason.clone()),
            total_requests: self.total_requests,
            total_errors: self.total_errors,
        }
    }
}
