//! Bounded problem and milestone logs
//!
//! Problems keep the most recent N entries per kind plus a running
//! counter; milestones keep at most N per kind, append-only within the
//! cap. Both serialize into the context snapshot.

use serde::Serialize;
use std::collections::HashMap;

use crate::events::Severity;

/// Most recent problems retained per kind
pub const PROBLEMS_PER_KIND: usize = 20;
/// Most recent milestones retained per kind
pub const MILESTONES_PER_KIND: usize = 12;

#[derive(Debug, Clone, Serialize)]
pub struct ProblemEntry {
    pub kind: String,
    pub severity: Severity,
    pub message: String,
    pub details: serde_json::Value,
    pub at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MilestoneEntry {
    pub kind: String,
    pub message: String,
    pub details: serde_json::Value,
    pub at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Default)]
pub(crate) struct DiagnosticsLog {
    problems: HashMap<String, Vec<ProblemEntry>>,
    problem_counts: HashMap<String, u64>,
    milestones: HashMap<String, Vec<MilestoneEntry>>,
}

impl DiagnosticsLog {
    pub fn record_problem(
        &mut self,
        kind: &str,
        severity: Severity,
        message: &str,
        details: serde_json::Value,
    ) {
        *self.problem_counts.entry(kind.to_string()).or_default() += 1;
        let entries = self.problems.entry(kind.to_string()).or_default();
        entries.push(ProblemEntry {
            kind: kind.to_string(),
            severity,
            message: message.to_string(),
            details,
            at: chrono::Utc::now(),
        });
        if entries.len() > PROBLEMS_PER_KIND {
            let excess = entries.len() - PROBLEMS_PER_KIND;
            entries.drain(..excess);
        }
    }

    pub fn record_milestone(&mut self, kind: &str, message: &str, details: serde_json::Value) {
        let entries = self.milestones.entry(kind.to_string()).or_default();
        entries.push(MilestoneEntry {
            kind: kind.to_string(),
            message: message.to_string(),
            details,
            at: chrono::Utc::now(),
        });
        if entries.len() > MILESTONES_PER_KIND {
            let excess = entries.len() - MILESTONES_PER_KIND;
            entries.drain(..excess);
        }
    }

    pub fn problem_count(&self, kind: &str) -> u64 {
        self.problem_counts.get(kind).copied().unwrap_or(0)
    }

    pub fn problems(&self, kind: &str) -> Vec<ProblemEntry> {
        self.problems.get(kind).cloned().unwrap_or_default()
    }

    pub fn milestones(&self, kind: &str) -> Vec<MilestoneEntry> {
        self.milestones.get(kind).cloned().unwrap_or_default()
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "problem_counts": self.problem_counts,
            "problems": self.problems,
            "milestones": self.milestones,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn problem_log_is_bounded_per_kind() {
        let mut log = DiagnosticsLog::default();
        for i in 0..50 {
            log.record_problem(
                "fetch-failed",
                Severity::Warning,
                &format!("attempt {i}"),
                serde_json::Value::Null,
            );
        }
        assert_eq!(log.problem_count("fetch-failed"), 50);
        let kept = log.problems("fetch-failed");
        assert_eq!(kept.len(), PROBLEMS_PER_KIND);
        // the oldest entries were dropped
        assert_eq!(kept[0].message, "attempt 30");
    }

    #[test]
    fn milestone_log_caps_per_kind() {
        let mut log = DiagnosticsLog::default();
        for i in 0..20 {
            log.record_milestone("hub-found", &format!("hub {i}"), serde_json::Value::Null);
        }
        assert_eq!(log.milestones("hub-found").len(), MILESTONES_PER_KIND);
    }
}
