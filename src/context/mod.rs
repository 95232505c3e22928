//! Authoritative crawl state
//!
//! `CrawlContext` owns every piece of mutable job state: URL lifecycle,
//! per-host domain records, diagnostics, and aggregate stats. Components
//! hold a shared handle and mutate only through the named methods here;
//! each mutation is atomic per key and surfaces on the event bus. After
//! `finish()` the context is frozen and every mutator fails with
//! [`ContextError::AlreadyFinished`].

pub mod diagnostics;
pub mod domain;
pub mod stats;

use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::classify::Classification;
use crate::config::CrawlConfig;
use crate::decision::Decision;
use crate::events::{CrawlEvent, CrawlStatus, EventBus, QueueOperation, Severity};

use diagnostics::{DiagnosticsLog, MilestoneEntry, ProblemEntry};
use domain::{BlockState, DomainAvailability, DomainSnapshot, DomainState};

pub use diagnostics::{MILESTONES_PER_KIND, PROBLEMS_PER_KIND};
pub use stats::{CrawlStats, StatsSnapshot};

/// Context mutation errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ContextError {
    #[error("crawl context is finished and rejects further mutation")]
    AlreadyFinished,
}

/// Lifecycle of one URL within the job
///
/// A URL is in at most one state; absence from the map means not-seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlState {
    Queued,
    InFlight,
    Visited,
}

pub struct CrawlContext {
    job_id: String,
    start_url: String,
    host_window: Duration,
    started_at: Instant,

    urls: DashMap<String, UrlState>,
    decided: DashMap<String, Decision>,
    analyzed: DashMap<String, Vec<Classification>>,
    domains: DashMap<String, DomainState>,

    diagnostics: Mutex<DiagnosticsLog>,
    stats: CrawlStats,
    progress: Mutex<(u64, u64)>,
    queue_tallies: [AtomicU64; 4],

    finished: AtomicBool,
    final_status: Mutex<Option<CrawlStatus>>,

    bus: Arc<EventBus>,
}

impl CrawlContext {
    #[must_use]
    pub fn new(config: &CrawlConfig, bus: Arc<EventBus>) -> Self {
        Self {
            job_id: config.job_id().to_string(),
            start_url: config.start_url().to_string(),
            host_window: config.host_window(),
            started_at: Instant::now(),
            urls: DashMap::new(),
            decided: DashMap::new(),
            analyzed: DashMap::new(),
            domains: DashMap::new(),
            diagnostics: Mutex::new(DiagnosticsLog::default()),
            stats: CrawlStats::default(),
            progress: Mutex::new((0, 0)),
            queue_tallies: Default::default(),
            finished: AtomicBool::new(false),
            final_status: Mutex::new(None),
            bus,
        }
    }

    #[must_use]
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    #[must_use]
    pub fn start_url(&self) -> &str {
        &self.start_url
    }

    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    #[must_use]
    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    #[must_use]
    pub fn stats(&self) -> &CrawlStats {
        &self.stats
    }

    fn ensure_active(&self) -> Result<(), ContextError> {
        if self.finished.load(Ordering::Acquire) {
            Err(ContextError::AlreadyFinished)
        } else {
            Ok(())
        }
    }

    // ---- URL lifecycle -------------------------------------------------

    /// Transition not-seen -> queued. Fails the transition (returning
    /// `Ok(false)`) if the URL is already queued, in flight, or visited.
    pub fn mark_queued(&self, url: &str, depth: u16, priority: i32) -> Result<bool, ContextError> {
        self.ensure_active()?;
        match self.urls.entry(url.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Ok(false),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(UrlState::Queued);
                self.stats.add_queued();
                self.bus
                    .publish(CrawlEvent::url_queued(url.to_string(), depth, priority));
                Ok(true)
            }
        }
    }

    /// Transition queued -> in-flight; the calling worker owns the fetch.
    pub fn begin_fetch(&self, url: &str) -> Result<bool, ContextError> {
        self.ensure_active()?;
        match self.urls.get_mut(url) {
            Some(mut state) if *state == UrlState::Queued => {
                *state = UrlState::InFlight;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Transition in-flight -> queued, for retry verdicts.
    pub fn requeue(&self, url: &str) -> Result<bool, ContextError> {
        self.ensure_active()?;
        match self.urls.get_mut(url) {
            Some(mut state) if *state == UrlState::InFlight => {
                *state = UrlState::Queued;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Transition to visited (idempotent; returns whether newly visited).
    pub fn mark_visited(&self, url: &str) -> Result<bool, ContextError> {
        self.ensure_active()?;
        let prior = self.urls.insert(url.to_string(), UrlState::Visited);
        let newly = prior != Some(UrlState::Visited);
        if newly {
            self.stats.add_visited();
        }
        Ok(newly)
    }

    /// Give up on a URL it no longer makes sense to hold: it returns to
    /// not-seen and may be re-discovered later.
    pub fn abandon(&self, url: &str) -> Result<bool, ContextError> {
        self.ensure_active()?;
        Ok(self.urls.remove(url).is_some())
    }

    /// Terminal state for a URL that failed permanently: counted as an
    /// error elsewhere, never as a visit, and never re-queued.
    pub fn mark_abandoned(&self, url: &str) -> Result<(), ContextError> {
        self.ensure_active()?;
        self.urls.insert(url.to_string(), UrlState::Visited);
        Ok(())
    }

    #[must_use]
    pub fn url_state(&self, url: &str) -> Option<UrlState> {
        self.urls.get(url).map(|s| *s)
    }

    #[must_use]
    pub fn is_visited(&self, url: &str) -> bool {
        self.url_state(url) == Some(UrlState::Visited)
    }

    /// Queued here includes in-flight: the URL is owned and must not be
    /// queued again.
    #[must_use]
    pub fn is_queued(&self, url: &str) -> bool {
        matches!(
            self.url_state(url),
            Some(UrlState::Queued | UrlState::InFlight)
        )
    }

    // ---- Decision / analysis maps --------------------------------------

    pub fn record_decision(&self, url: &str, decision: Decision) -> Result<(), ContextError> {
        self.ensure_active()?;
        self.decided.insert(url.to_string(), decision);
        Ok(())
    }

    #[must_use]
    pub fn decision_for(&self, url: &str) -> Option<Decision> {
        self.decided.get(url).map(|d| d.clone())
    }

    pub fn record_analysis(
        &self,
        url: &str,
        classifications: Vec<Classification>,
    ) -> Result<(), ContextError> {
        self.ensure_active()?;
        self.analyzed.insert(url.to_string(), classifications);
        Ok(())
    }

    #[must_use]
    pub fn analysis_for(&self, url: &str) -> Option<Vec<Classification>> {
        self.analyzed.get(url).map(|a| a.clone())
    }

    // ---- Domain registry -----------------------------------------------

    pub fn record_domain_request(&self, host: &str) -> Result<(), ContextError> {
        self.ensure_active()?;
        let window = self.host_window;
        self.domains
            .entry(host.to_string())
            .or_insert_with(|| DomainState::new(host))
            .record_request(window);
        Ok(())
    }

    /// Record an error for the host; returns errors in the sliding window.
    pub fn record_domain_error(&self, host: &str) -> Result<usize, ContextError> {
        self.ensure_active()?;
        self.stats.add_error();
        let window = self.host_window;
        let count = self
            .domains
            .entry(host.to_string())
            .or_insert_with(|| DomainState::new(host))
            .record_error(window);
        Ok(count)
    }

    /// A success ages one error out of the host's window.
    pub fn record_domain_success(&self, host: &str) -> Result<(), ContextError> {
        self.ensure_active()?;
        let window = self.host_window;
        if let Some(mut state) = self.domains.get_mut(host) {
            state.record_success(window);
        }
        Ok(())
    }

    pub fn throttle_domain(&self, host: &str, duration: Duration) -> Result<(), ContextError> {
        self.ensure_active()?;
        let until = Instant::now() + duration;
        {
            let mut state = self
                .domains
                .entry(host.to_string())
                .or_insert_with(|| DomainState::new(host));
            state.throttled_until = Some(match state.throttled_until {
                Some(existing) if existing > until => existing,
                _ => until,
            });
        }
        self.bus
            .publish(CrawlEvent::domain_throttled(host.to_string(), duration));
        Ok(())
    }

    /// Lock a host out. Emits `domain:blocked` exactly once per lockout;
    /// returns whether this call established the block.
    pub fn block_domain(
        &self,
        host: &str,
        reason: &str,
        duration: Option<Duration>,
    ) -> Result<bool, ContextError> {
        self.ensure_active()?;
        let newly = {
            let mut state = self
                .domains
                .entry(host.to_string())
                .or_insert_with(|| DomainState::new(host));
            if state.is_blocked() {
                false
            } else {
                state.block = Some(BlockState {
                    reason: reason.to_string(),
                    until: duration.map(|d| Instant::now() + d),
                });
                true
            }
        };
        if newly {
            self.bus.publish(CrawlEvent::domain_blocked(
                host.to_string(),
                reason.to_string(),
            ));
        }
        Ok(newly)
    }

    #[must_use]
    pub fn domain_availability(&self, host: &str) -> DomainAvailability {
        match self.domains.get_mut(host) {
            Some(mut state) => state.availability(),
            None => DomainAvailability::Available,
        }
    }

    #[must_use]
    pub fn domain_errors_in_window(&self, host: &str) -> usize {
        let window = self.host_window;
        match self.domains.get_mut(host) {
            Some(mut state) => state.errors_in_window(window),
            None => 0,
        }
    }

    #[must_use]
    pub fn domain_snapshot(&self, host: &str) -> Option<DomainSnapshot> {
        self.domains.get(host).map(|state| state.snapshot())
    }

    // ---- Diagnostics ---------------------------------------------------

    pub fn record_problem(
        &self,
        kind: &str,
        severity: Severity,
        message: &str,
        details: serde_json::Value,
    ) {
        // Problems are accepted even after finish: late worker teardown
        // may still report, and losing it would hide the cause.
        self.diagnostics
            .lock()
            .record_problem(kind, severity, message, details);
    }

    pub fn record_milestone(&self, kind: &str, message: &str, details: serde_json::Value) {
        self.diagnostics.lock().record_milestone(kind, message, details);
    }

    #[must_use]
    pub fn problem_count(&self, kind: &str) -> u64 {
        self.diagnostics.lock().problem_count(kind)
    }

    #[must_use]
    pub fn problems(&self, kind: &str) -> Vec<ProblemEntry> {
        self.diagnostics.lock().problems(kind)
    }

    #[must_use]
    pub fn milestones(&self, kind: &str) -> Vec<MilestoneEntry> {
        self.diagnostics.lock().milestones(kind)
    }

    pub fn note_progress(&self, current: u64, total: u64) {
        *self.progress.lock() = (current, total);
    }

    pub fn tally_queue_operation(&self, operation: QueueOperation) {
        let idx = match operation {
            QueueOperation::Enqueue => 0,
            QueueOperation::Dequeue => 1,
            QueueOperation::Defer => 2,
            QueueOperation::Complete => 3,
        };
        self.queue_tallies[idx].fetch_add(1, Ordering::Relaxed);
    }

    // ---- Lifecycle -----------------------------------------------------

    /// Freeze the context. Idempotent for the same status; later mutation
    /// attempts fail with [`ContextError::AlreadyFinished`].
    pub fn finish(&self, status: CrawlStatus) {
        if !self.finished.swap(true, Ordering::AcqRel) {
            *self.final_status.lock() = Some(status);
        }
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn final_status(&self) -> Option<CrawlStatus> {
        *self.final_status.lock()
    }

    /// Full serializable snapshot for persistence and debugging
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let domains: Vec<DomainSnapshot> = self
            .domains
            .iter()
            .map(|entry| entry.value().snapshot())
            .collect();
        let (current, total) = *self.progress.lock();
        serde_json::json!({
            "job_id": self.job_id,
            "start_url": self.start_url,
            "status": self.final_status().map(|s| s.as_str()),
            "finished": self.is_finished(),
            "stats": self.stats.snapshot(),
            "progress": { "current": current, "total": total },
            "queue_tallies": {
                "enqueue": self.queue_tallies[0].load(Ordering::Relaxed),
                "dequeue": self.queue_tallies[1].load(Ordering::Relaxed),
                "defer": self.queue_tallies[2].load(Ordering::Relaxed),
                "complete": self.queue_tallies[3].load(Ordering::Relaxed),
            },
            "urls_tracked": self.urls.len(),
            "domains": domains,
            "diagnostics": self.diagnostics.lock().to_json(),
        })
    }
}
