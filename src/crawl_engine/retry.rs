//! Failure classification and hierarchical retry policy
//!
//! Every failed fetch is classified into one of six error classes, each
//! with its own handling: exponential backoff for transient faults,
//! domain throttling for 429s, host lockout for repeated server errors,
//! escalation to a full domain block for connection resets, immediate
//! abandonment for permanent failures.

use dashmap::DashMap;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;

use crate::config::CrawlConfig;
use crate::context::CrawlContext;

use super::crawl_types::FetchError;
use super::rate_limiter::HostRateLimiter;

/// Connection resets tolerated per host before the domain is blocked
const MAX_RESETS_PER_HOST: u32 = 3;

/// Failure classes, ordered roughly by recoverability
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Transient,
    RateLimited,
    ServerError,
    ConnectionReset,
    Permanent,
    Unknown,
}

impl ErrorClass {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transient => "transient",
            Self::RateLimited => "rate-limited",
            Self::ServerError => "server-error",
            Self::ConnectionReset => "connection-reset",
            Self::Permanent => "permanent",
            Self::Unknown => "unknown",
        }
    }
}

/// What to do with the failed entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryAction {
    /// Requeue with backoff
    Retry,
    /// Requeue after the domain throttle lifts
    Defer,
    /// Give up on this URL
    Abandon,
    /// Host is locked out; give up and skip the host
    BlockHost,
}

/// Verdict for one failed fetch
#[derive(Debug, Clone)]
pub struct RetryVerdict {
    pub should_retry: bool,
    pub action: RetryAction,
    pub delay: Duration,
    pub reason: String,
}

impl RetryVerdict {
    fn abandon(reason: impl Into<String>) -> Self {
        Self {
            should_retry: false,
            action: RetryAction::Abandon,
            delay: Duration::ZERO,
            reason: reason.into(),
        }
    }
}

/// Classify a fetch error without consulting any state
#[must_use]
pub fn classify(error: &FetchError) -> ErrorClass {
    match error {
        FetchError::Timeout => ErrorClass::Transient,
        FetchError::ConnectionRefused => ErrorClass::ServerError,
        FetchError::ConnectionReset => ErrorClass::ConnectionReset,
        FetchError::Dns(_) => ErrorClass::Permanent,
        FetchError::Http { status, .. } => match status {
            429 => ErrorClass::RateLimited,
            500..=599 => ErrorClass::ServerError,
            403 | 404 | 410 => ErrorClass::Permanent,
            _ => ErrorClass::Unknown,
        },
        FetchError::Io(msg) => {
            if msg.contains("timed out") || msg.contains("timeout") {
                ErrorClass::Transient
            } else {
                ErrorClass::Unknown
            }
        }
        FetchError::Other(_) => ErrorClass::Unknown,
    }
}

/// Applies retry/throttle/lockout policy across network, host, and
/// domain scopes
pub struct RetryCoordinator {
    config: Arc<CrawlConfig>,
    context: Arc<CrawlContext>,
    limiter: Arc<HostRateLimiter>,
    resets: DashMap<String, u32>,
}

impl RetryCoordinator {
    #[must_use]
    pub fn new(
        config: Arc<CrawlConfig>,
        context: Arc<CrawlContext>,
        limiter: Arc<HostRateLimiter>,
    ) -> Self {
        Self {
            config,
            context,
            limiter,
            resets: DashMap::new(),
        }
    }

    /// Per-domain rate-limit token: try to take one now
    #[must_use]
    pub fn acquire_token(&self, host: &str) -> bool {
        matches!(
            self.limiter.check(host),
            super::rate_limiter::RateDecision::Allow
        )
    }

    /// Time until the host has a token available
    #[must_use]
    pub fn token_wait_time(&self, host: &str) -> Duration {
        self.limiter.wait_time(host)
    }

    /// Record a success: ages one error out of the host window and
    /// resets the connection-reset streak.
    pub fn on_success(&self, host: &str) {
        let _ = self.context.record_domain_success(host);
        self.resets.remove(host);
    }

    /// Decide what to do about a failed fetch
    ///
    /// `attempt` is the number of retries already performed for this URL
    /// (0 on the first failure).
    pub fn on_failure(&self, host: &str, url: &str, attempt: u8, error: &FetchError) -> RetryVerdict {
        let class = classify(error);
        let errors_in_window = self.context.record_domain_error(host).unwrap_or(0);

        match class {
            ErrorClass::Transient => self.backoff_or_abandon(attempt, 1.0, "transient"),

            ErrorClass::RateLimited => {
                let delay = match error {
                    FetchError::Http {
                        retry_after: Some(d),
                        ..
                    } => *d,
                    _ => self.config.throttle_duration(),
                };
                let _ = self.context.throttle_domain(host, delay);
                log::info!("rate limited by {host}; throttling domain for {delay:?}");
                RetryVerdict {
                    should_retry: true,
                    action: RetryAction::Defer,
                    delay,
                    reason: "rate-limited".to_string(),
                }
            }

            ErrorClass::ServerError => {
                if errors_in_window >= self.config.host_max_errors() as usize {
                    let lockout = self.config.host_lockout();
                    let _ = self.context.block_domain(host, "server-errors", Some(lockout));
                    log::warn!(
                        "{host} locked out for {lockout:?} after {errors_in_window} errors ({url})"
                    );
                    RetryVerdict {
                        should_retry: false,
                        action: RetryAction::BlockHost,
                        delay: lockout,
                        reason: "server-error".to_string(),
                    }
                } else {
                    self.backoff_or_abandon(attempt, 1.0, "server-error")
                }
            }

            ErrorClass::ConnectionReset => {
                let streak = {
                    let mut count = self.resets.entry(host.to_string()).or_insert(0);
                    *count += 1;
                    *count
                };
                if streak >= MAX_RESETS_PER_HOST {
                    let _ = self.context.block_domain(host, "connection-resets", None);
                    log::warn!("{host} blocked after {streak} connection resets");
                    RetryVerdict {
                        should_retry: false,
                        action: RetryAction::BlockHost,
                        delay: Duration::ZERO,
                        reason: "connection-reset".to_string(),
                    }
                } else {
                    // Resets back off twice as hard as plain transients
                    self.backoff_or_abandon(attempt, 2.0, "connection-reset")
                }
            }

            ErrorClass::Permanent => RetryVerdict::abandon("permanent"),
            ErrorClass::Unknown => RetryVerdict::abandon("unknown"),
        }
    }

    fn backoff_or_abandon(&self, attempt: u8, multiplier: f64, reason: &str) -> RetryVerdict {
        if attempt >= self.config.max_retries() {
            return RetryVerdict::abandon(format!("{reason}-exhausted"));
        }
        RetryVerdict {
            should_retry: true,
            action: RetryAction::Retry,
            delay: self.backoff_delay(attempt, multiplier),
            reason: reason.to_string(),
        }
    }

    /// `base * 2^attempt * multiplier`, capped, with symmetric jitter
    #[must_use]
    pub fn backoff_delay(&self, attempt: u8, multiplier: f64) -> Duration {
        let base = self.config.retry_base_delay().as_millis() as u64;
        let cap = self.config.retry_max_delay().as_millis() as u64;
        let exp = base.saturating_mul(1u64 << u32::from(attempt.min(10)));
        let adjusted = (exp as f64 * multiplier) as u64;
        let jitter_factor = self.config.retry_jitter_factor();
        let jitter = if jitter_factor > 0.0 {
            rand::rng().random_range(-jitter_factor..=jitter_factor)
        } else {
            0.0
        };
        let jittered = (adjusted as f64 * (1.0 + jitter)).max(0.0) as u64;
        Duration::from_millis(jittered.min(cap))
    }
}

/// Parse a Retry-After header value: either delta-seconds or an HTTP date
#[must_use]
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let when = chrono::DateTime::parse_from_rfc2822(value).ok()?;
    let delta = when.with_timezone(&chrono::Utc) - chrono::Utc::now();
    delta.to_std().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_table() {
        assert_eq!(classify(&FetchError::Timeout), ErrorClass::Transient);
        assert_eq!(
            classify(&FetchError::Http {
                status: 429,
                retry_after: None
            }),
            ErrorClass::RateLimited
        );
        assert_eq!(
            classify(&FetchError::Http {
                status: 503,
                retry_after: None
            }),
            ErrorClass::ServerError
        );
        assert_eq!(
            classify(&FetchError::ConnectionRefused),
            ErrorClass::ServerError
        );
        assert_eq!(
            classify(&FetchError::ConnectionReset),
            ErrorClass::ConnectionReset
        );
        assert_eq!(
            classify(&FetchError::Http {
                status: 404,
                retry_after: None
            }),
            ErrorClass::Permanent
        );
        assert_eq!(
            classify(&FetchError::Dns("no such host".into())),
            ErrorClass::Permanent
        );
        assert_eq!(
            classify(&FetchError::Other("???".into())),
            ErrorClass::Unknown
        );
    }

    #[test]
    fn retry_after_parses_seconds_and_dates() {
        assert_eq!(parse_retry_after("2"), Some(Duration::from_secs(2)));
        assert_eq!(parse_retry_after(" 10 "), Some(Duration::from_secs(10)));
        let future = (chrono::Utc::now() + chrono::Duration::seconds(30)).to_rfc2822();
        let parsed = parse_retry_after(&future).expect("date should parse");
        assert!(parsed <= Duration::from_secs(30));
        assert!(parsed >= Duration::from_secs(25));
        assert_eq!(parse_retry_after("soon"), None);
    }
}
