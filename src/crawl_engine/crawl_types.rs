//! Core types for crawl operations
//!
//! Queue entries, fetch results, and the fetch error taxonomy shared by
//! the pipeline and the retry coordinator.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

/// An item awaiting fetch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEntry {
    pub url: String,
    pub host: String,
    pub depth: u16,
    /// Advisory; higher wins
    pub priority: i32,
    pub discovered_at: chrono::DateTime<chrono::Utc>,
    pub referrer: Option<String>,
    /// Number of retry attempts so far (0 = first attempt)
    #[serde(default)]
    pub retry_count: u8,
}

impl QueueEntry {
    /// A depth-0 entry with no referrer
    #[must_use]
    pub fn seed(url: &str, host: &str, priority: i32) -> Self {
        Self {
            url: url.to_string(),
            host: host.to_string(),
            depth: 0,
            priority,
            discovered_at: chrono::Utc::now(),
            referrer: None,
            retry_count: 0,
        }
    }

    /// An entry discovered from `referrer`; depth is referrer depth + 1
    #[must_use]
    pub fn discovered(url: &str, host: &str, referrer: &QueueEntry, priority: i32) -> Self {
        Self {
            url: url.to_string(),
            host: host.to_string(),
            depth: referrer.depth + 1,
            priority,
            discovered_at: chrono::Utc::now(),
            referrer: Some(referrer.url.clone()),
            retry_count: 0,
        }
    }
}

/// Conditional-request validators from a previous response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheValidators {
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

impl CacheValidators {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.etag.is_none() && self.last_modified.is_none()
    }
}

/// Outcome of a successful HTTP acquisition
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub url: String,
    /// URL after redirects
    pub final_url: String,
    pub http_status: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
    pub elapsed_ms: u64,
    pub bytes_downloaded: u64,
    /// Server answered 304 and `body` is the previously stored payload
    pub not_modified: bool,
    pub cache_validators: CacheValidators,
    /// Hex sha256 of `body`
    pub content_sha256: String,
}

impl FetchResult {
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get("content-type").map(String::as_str)
    }

    #[must_use]
    pub fn is_html(&self) -> bool {
        self.content_type()
            .is_some_and(|ct| ct.starts_with("text/html") || ct.starts_with("application/xhtml"))
    }
}

/// Fetch failures, shaped for classification
#[derive(Debug, Clone)]
pub enum FetchError {
    /// Total or per-read timeout elapsed
    Timeout,
    ConnectionRefused,
    ConnectionReset,
    /// Name resolution failed
    Dns(String),
    /// Non-success HTTP status; 429 carries the parsed Retry-After
    Http {
        status: u16,
        retry_after: Option<Duration>,
    },
    /// Other transport-level I/O failure
    Io(String),
    Other(String),
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "request timed out"),
            Self::ConnectionRefused => write!(f, "connection refused"),
            Self::ConnectionReset => write!(f, "connection reset by peer"),
            Self::Dns(msg) => write!(f, "dns resolution failed: {msg}"),
            Self::Http { status, .. } => write!(f, "http status {status}"),
            Self::Io(msg) => write!(f, "i/o error: {msg}"),
            Self::Other(msg) => write!(f, "fetch error: {msg}"),
        }
    }
}

impl std::error::Error for FetchError {}

impl FetchError {
    /// Map a reqwest transport error onto the taxonomy
    #[must_use]
    pub fn from_reqwest(error: &reqwest::Error) -> Self {
        if error.is_timeout() {
            return Self::Timeout;
        }
        let msg = error.to_string().to_lowercase();
        if msg.contains("dns") || msg.contains("resolve") {
            return Self::Dns(msg);
        }
        if msg.contains("refused") {
            return Self::ConnectionRefused;
        }
        if msg.contains("reset") || msg.contains("broken pipe") || msg.contains("hang up") {
            return Self::ConnectionReset;
        }
        if error.is_connect() || error.is_body() || error.is_request() {
            return Self::Io(msg);
        }
        Self::Other(msg)
    }
}
