//! Structured-output line protocol
//!
//! Subprocesses (and the crawl loop's own reporters) emit one event per
//! line as `KIND|<json>` with `KIND` one of PROGRESS, MILESTONE, TELEMETRY,
//! PROBLEM, QUEUE. The handler parses each line, records it on the crawl
//! context, and rebroadcasts it on the event bus. Malformed lines become
//! `structured-parse-error` problems and are never rebroadcast.

use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use super::bus::EventBus;
use super::types::{CrawlEvent, QueueOperation, Severity};
use crate::context::CrawlContext;

/// Minimum spacing between rebroadcast PROGRESS events
const PROGRESS_THROTTLE: Duration = Duration::from_millis(200);

#[derive(Debug, Deserialize)]
struct ProgressPayload {
    percent: f64,
    current: u64,
    total: u64,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct MilestonePayload {
    kind: String,
    message: String,
    #[serde(default)]
    details: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct TelemetryPayload {
    kind: String,
    value: f64,
    #[serde(default)]
    unit: String,
    #[serde(default)]
    extras: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ProblemPayload {
    kind: String,
    severity: Severity,
    message: String,
    #[serde(default)]
    details: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct QueuePayload {
    operation: QueueOperation,
    url: String,
    #[serde(default)]
    depth: Option<u16>,
}

/// Outcome of feeding one line to the handler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineOutcome {
    /// Parsed, recorded, and rebroadcast
    Broadcast,
    /// Parsed and recorded but suppressed by the progress throttle
    Throttled,
    /// Line did not match the grammar; recorded as a parse problem
    Malformed,
}

/// Parses structured event lines and fans them out
pub struct EventHandler {
    context: Arc<CrawlContext>,
    bus: Arc<EventBus>,
    last_progress: Mutex<Option<Instant>>,
}

impl EventHandler {
    #[must_use]
    pub fn new(context: Arc<CrawlContext>, bus: Arc<EventBus>) -> Self {
        Self {
            context,
            bus,
            last_progress: Mutex::new(None),
        }
    }

    /// Feed one line of structured output
    pub fn handle_line(&self, line: &str) -> LineOutcome {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            return LineOutcome::Malformed;
        }
        let Some((kind, payload)) = line.split_once('|') else {
            self.record_parse_error(line, "missing '|' separator");
            return LineOutcome::Malformed;
        };

        match kind {
            "PROGRESS" => self.handle_progress(line, payload),
            "MILESTONE" => self.handle_milestone(line, payload),
            "TELEMETRY" => self.handle_telemetry(line, payload),
            "PROBLEM" => self.handle_problem(line, payload),
            "QUEUE" => self.handle_queue(line, payload),
            other => {
                self.record_parse_error(line, &format!("unknown kind {other:?}"));
                LineOutcome::Malformed
            }
        }
    }

    /// Feed a whole chunk of output, line by line
    pub fn handle_chunk(&self, chunk: &str) {
        for line in chunk.lines() {
            if !line.trim().is_empty() {
                self.handle_line(line);
            }
        }
    }

    fn handle_progress(&self, line: &str, payload: &str) -> LineOutcome {
        let parsed: ProgressPayload = match serde_json::from_str(payload) {
            Ok(p) => p,
            Err(e) => {
                self.record_parse_error(line, &e.to_string());
                return LineOutcome::Malformed;
            }
        };

        // Throttle rebroadcast to one per 200 ms; state is still updated.
        let mut last = self.last_progress.lock();
        let now = Instant::now();
        let throttled = matches!(*last, Some(t) if now.duration_since(t) < PROGRESS_THROTTLE);
        if !throttled {
            *last = Some(now);
        }
        drop(last);

        self.context.note_progress(parsed.current, parsed.total);
        if throttled {
            return LineOutcome::Throttled;
        }
        self.bus.publish(CrawlEvent::progress(
            parsed.percent,
            parsed.current,
            parsed.total,
            parsed.message,
        ));
        LineOutcome::Broadcast
    }

    fn handle_milestone(&self, line: &str, payload: &str) -> LineOutcome {
        let parsed: MilestonePayload = match serde_json::from_str(payload) {
            Ok(p) => p,
            Err(e) => {
                self.record_parse_error(line, &e.to_string());
                return LineOutcome::Malformed;
            }
        };
        self.context
            .record_milestone(&parsed.kind, &parsed.message, parsed.details.clone());
        self.bus.publish(CrawlEvent::milestone(
            parsed.kind,
            parsed.message,
            parsed.details,
        ));
        LineOutcome::Broadcast
    }

    fn handle_telemetry(&self, line: &str, payload: &str) -> LineOutcome {
        let parsed: TelemetryPayload = match serde_json::from_str(payload) {
            Ok(p) => p,
            Err(e) => {
                self.record_parse_error(line, &e.to_string());
                return LineOutcome::Malformed;
            }
        };
        // Telemetry is forwarded verbatim, nothing is recorded on the context.
        self.bus.publish(CrawlEvent::Telemetry {
            kind: parsed.kind,
            value: parsed.value,
            unit: parsed.unit,
            extras: parsed.extras,
            timestamp: chrono::Utc::now(),
        });
        LineOutcome::Broadcast
    }

    fn handle_problem(&self, line: &str, payload: &str) -> LineOutcome {
        let parsed: ProblemPayload = match serde_json::from_str(payload) {
            Ok(p) => p,
            Err(e) => {
                self.record_parse_error(line, &e.to_string());
                return LineOutcome::Malformed;
            }
        };
        self.context.record_problem(
            &parsed.kind,
            parsed.severity,
            &parsed.message,
            parsed.details.clone(),
        );
        self.bus.publish(CrawlEvent::problem(
            parsed.kind,
            parsed.severity,
            parsed.message,
            parsed.details,
        ));
        LineOutcome::Broadcast
    }

    fn handle_queue(&self, line: &str, payload: &str) -> LineOutcome {
        let parsed: QueuePayload = match serde_json::from_str(payload) {
            Ok(p) => p,
            Err(e) => {
                self.record_parse_error(line, &e.to_string());
                return LineOutcome::Malformed;
            }
        };
        self.context.tally_queue_operation(parsed.operation);
        self.bus.publish(CrawlEvent::queue_changed(
            parsed.operation,
            parsed.url,
            parsed.depth,
        ));
        LineOutcome::Broadcast
    }

    fn record_parse_error(&self, line: &str, error: &str) {
        log::debug!("structured line rejected: {error}");
        self.context.record_problem(
            "structured-parse-error",
            Severity::Warning,
            error,
            serde_json::json!({ "line": truncate(line, 200) }),
        );
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
