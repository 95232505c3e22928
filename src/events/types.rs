//! Event type definitions for the crawl event system
//!
//! Every externally observable state change flows through one of these
//! variants. Event names are slash-qualified (`url:visited`,
//! `domain:throttled`) and stable across releases.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Why a crawl ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CrawlStatus {
    Completed,
    Aborted,
    Failed,
}

impl CrawlStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Aborted => "aborted",
            Self::Failed => "failed",
        }
    }
}

/// Severity attached to problem events
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// Queue operations reported over the line protocol and the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueOperation {
    Enqueue,
    Dequeue,
    Defer,
    Complete,
}

/// Events emitted during the crawl process
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CrawlEvent {
    /// A crawl job started
    CrawlStarted {
        job_id: String,
        start_url: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
    /// A crawl job reached a terminal state
    CrawlFinished {
        job_id: String,
        status: CrawlStatus,
        pages_visited: u64,
        duration: Duration,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
    /// One init stage of the startup sequence reported in
    InitStage {
        stage: String,
        status: String,
        duration_ms: u64,
        message: Option<String>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
    UrlQueued {
        url: String,
        depth: u16,
        priority: i32,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
    UrlVisited {
        url: String,
        http_status: u16,
        elapsed_ms: u64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
    UrlSkipped {
        url: String,
        reason: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
    ArticleFound {
        url: String,
        category: String,
        confidence: f64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
    DomainThrottled {
        host: String,
        retry_after: Duration,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
    DomainBlocked {
        host: String,
        reason: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
    Progress {
        percent: f64,
        current: u64,
        total: u64,
        message: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
    Milestone {
        kind: String,
        message: String,
        details: serde_json::Value,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
    Problem {
        kind: String,
        severity: Severity,
        message: String,
        details: serde_json::Value,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
    Telemetry {
        kind: String,
        value: f64,
        unit: String,
        extras: serde_json::Value,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
    QueueChanged {
        operation: QueueOperation,
        url: String,
        depth: Option<u16>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
    SequenceStarted {
        sequence: String,
        steps: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
    SequenceCompleted {
        sequence: String,
        succeeded: usize,
        failed: usize,
        elapsed_ms: u64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
    StepStarted {
        step_id: String,
        operation: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
    StepCompleted {
        step_id: String,
        operation: String,
        elapsed_ms: u64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
    StepError {
        step_id: String,
        operation: String,
        error: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
    PlanRecomputed {
        completed_steps: usize,
        new_steps: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl CrawlEvent {
    /// Slash-qualified event name, stable for subscribers that filter by kind
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::CrawlStarted { .. } => "crawl:started",
            Self::CrawlFinished { .. } => "crawl:finished",
            Self::InitStage { .. } => "crawl:init-stage",
            Self::UrlQueued { .. } => "url:queued",
            Self::UrlVisited { .. } => "url:visited",
            Self::UrlSkipped { .. } => "url:skipped",
            Self::ArticleFound { .. } => "article:found",
            Self::DomainThrottled { .. } => "domain:throttled",
            Self::DomainBlocked { .. } => "domain:blocked",
            Self::Progress { .. } => "job:progress",
            Self::Milestone { .. } => "job:milestone",
            Self::Problem { .. } => "job:problem",
            Self::Telemetry { .. } => "job:telemetry",
            Self::QueueChanged { .. } => "queue:changed",
            Self::SequenceStarted { .. } => "sequence:start",
            Self::SequenceCompleted { .. } => "sequence:complete",
            Self::StepStarted { .. } => "step:start",
            Self::StepCompleted { .. } => "step:complete",
            Self::StepError { .. } => "step:error",
            Self::PlanRecomputed { .. } => "plan:recomputed",
        }
    }
}

/// Constructor helpers so call sites never hand-write timestamps
impl CrawlEvent {
    #[must_use]
    pub fn crawl_started(job_id: String, start_url: String) -> Self {
        Self::CrawlStarted {
            job_id,
            start_url,
            timestamp: chrono::Utc::now(),
        }
    }

    #[must_use]
    pub fn crawl_finished(
        job_id: String,
        status: CrawlStatus,
        pages_visited: u64,
        duration: Duration,
    ) -> Self {
        Self::CrawlFinished {
            job_id,
            status,
            pages_visited,
            duration,
            timestamp: chrono::Utc::now(),
        }
    }

    #[must_use]
    pub fn init_stage(stage: &str, status: &str, duration_ms: u64, message: Option<String>) -> Self {
        Self::InitStage {
            stage: stage.to_string(),
            status: status.to_string(),
            duration_ms,
            message,
            timestamp: chrono::Utc::now(),
        }
    }

    #[must_use]
    pub fn url_queued(url: String, depth: u16, priority: i32) -> Self {
        Self::UrlQueued {
            url,
            depth,
            priority,
            timestamp: chrono::Utc::now(),
        }
    }

    #[must_use]
    pub fn url_visited(url: String, http_status: u16, elapsed_ms: u64) -> Self {
        Self::UrlVisited {
            url,
            http_status,
            elapsed_ms,
            timestamp: chrono::Utc::now(),
        }
    }

    #[must_use]
    pub fn url_skipped(url: String, reason: String) -> Self {
        Self::UrlSkipped {
            url,
            reason,
            timestamp: chrono::Utc::now(),
        }
    }

    #[must_use]
    pub fn article_found(url: String, category: String, confidence: f64) -> Self {
        Self::ArticleFound {
            url,
            category,
            confidence,
            timestamp: chrono::Utc::now(),
        }
    }

    #[must_use]
    pub fn domain_throttled(host: String, retry_after: Duration) -> Self {
        Self::DomainThrottled {
            host,
            retry_after,
            timestamp: chrono::Utc::now(),
        }
    }

    #[must_use]
    pub fn domain_blocked(host: String, reason: String) -> Self {
        Self::DomainBlocked {
            host,
            reason,
            timestamp: chrono::Utc::now(),
        }
    }

    #[must_use]
    pub fn progress(percent: f64, current: u64, total: u64, message: String) -> Self {
        Self::Progress {
            percent,
            current,
            total,
            message,
            timestamp: chrono::Utc::now(),
        }
    }

    #[must_use]
    pub fn milestone(kind: String, message: String, details: serde_json::Value) -> Self {
        Self::Milestone {
            kind,
            message,
            details,
            timestamp: chrono::Utc::now(),
        }
    }

    #[must_use]
    pub fn problem(
        kind: String,
        severity: Severity,
        message: String,
        details: serde_json::Value,
    ) -> Self {
        Self::Problem {
            kind,
            severity,
            message,
            details,
            timestamp: chrono::Utc::now(),
        }
    }

    #[must_use]
    pub fn queue_changed(operation: QueueOperation, url: String, depth: Option<u16>) -> Self {
        Self::QueueChanged {
            operation,
            url,
            depth,
            timestamp: chrono::Utc::now(),
        }
    }

    #[must_use]
    pub fn plan_recomputed(completed_steps: usize, new_steps: usize) -> Self {
        Self::PlanRecomputed {
            completed_steps,
            new_steps,
            timestamp: chrono::Utc::now(),
        }
    }
}
