//! Decision verdict types

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// What to do with a URL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionAction {
    /// Eligible: fetch it now
    Fetch,
    /// A fresh cached artifact satisfies the request
    Cache,
    /// Do not fetch, now or later
    Skip,
    /// Not now; retry after `retry_after`
    Defer,
    /// Eligible: enqueue for later fetching
    Queue,
}

/// Why a URL is being examined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecideIntent {
    /// A worker wants to fetch the URL it just popped
    #[default]
    Fetch,
    /// A discovered out-link is being considered for the queue
    Enqueue,
}

/// Structured verdict for one URL
///
/// Deterministic given its inputs; failures in any check produce a
/// `Decision`, never an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub action: DecisionAction,
    pub reason: String,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub details: serde_json::Map<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<Duration>,
    /// Cached body for `Cache` verdicts; shared, never serialized
    #[serde(skip)]
    pub cached_data: Option<Arc<Vec<u8>>>,
}

impl Decision {
    #[must_use]
    pub fn new(action: DecisionAction, reason: &str) -> Self {
        Self {
            action,
            reason: reason.to_string(),
            details: serde_json::Map::new(),
            retry_after: None,
            cached_data: None,
        }
    }

    #[must_use]
    pub fn skip(reason: &str) -> Self {
        Self::new(DecisionAction::Skip, reason)
    }

    #[must_use]
    pub fn defer(reason: &str, retry_after: Duration) -> Self {
        let mut decision = Self::new(DecisionAction::Defer, reason);
        decision.retry_after = Some(retry_after);
        decision
    }

    #[must_use]
    pub fn with_detail(mut self, key: &str, value: serde_json::Value) -> Self {
        self.details.insert(key.to_string(), value);
        self
    }

    #[must_use]
    pub fn is_eligible(&self) -> bool {
        matches!(self.action, DecisionAction::Fetch | DecisionAction::Queue)
    }
}

/// Optional metadata accompanying a decision request
#[derive(Debug, Clone, Default)]
pub struct DecisionInput {
    pub referrer: Option<String>,
    pub depth: u16,
    pub priority: i32,
    pub force_recheck: bool,
    pub intent: DecideIntent,
}

impl DecisionInput {
    #[must_use]
    pub fn for_fetch(depth: u16) -> Self {
        Self {
            depth,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn for_enqueue(referrer: &str, depth: u16) -> Self {
        Self {
            referrer: Some(referrer.to_string()),
            depth,
            intent: DecideIntent::Enqueue,
            ..Self::default()
        }
    }
}
