//! Per-host token bucket rate limiter
//!
//! Buckets refill at `requests_per_minute / 60` tokens per second up to
//! `burst_size`. Checks are immediate Allow/Deny decisions; `acquire`
//! layers a bounded wait on top for callers that can afford to sleep.
//! Fractional tokens are kept so low rates stay accurate.

use dashmap::DashMap;
use std::time::{Duration, Instant};

/// Rate limit decision for one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    /// Token consumed; request may proceed
    Allow,
    /// No token; retry after the given wait
    Deny { retry_after: Duration },
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Token buckets keyed by host
///
/// Each bucket mutates under its map shard's lock; operations are short
/// and never block across an await.
pub struct HostRateLimiter {
    buckets: DashMap<String, Bucket>,
    rate_per_sec: f64,
    burst: f64,
}

impl HostRateLimiter {
    #[must_use]
    pub fn new(requests_per_minute: f64, burst_size: f64) -> Self {
        Self {
            buckets: DashMap::new(),
            rate_per_sec: (requests_per_minute / 60.0).max(f64::MIN_POSITIVE),
            burst: burst_size.max(1.0),
        }
    }

    fn refill(&self, bucket: &mut Bucket) {
        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        if elapsed > 0.0 {
            bucket.tokens = (bucket.tokens + elapsed * self.rate_per_sec).min(self.burst);
            bucket.last_refill = now;
        }
    }

    fn wait_for_one(&self, tokens: f64) -> Duration {
        let needed = (1.0 - tokens).max(0.0);
        Duration::from_secs_f64(needed / self.rate_per_sec)
    }

    /// Try to consume one token for the host
    pub fn check(&self, host: &str) -> RateDecision {
        let mut bucket = self
            .buckets
            .entry(host.to_string())
            .or_insert_with(|| Bucket {
                tokens: self.burst,
                last_refill: Instant::now(),
            });
        self.refill(&mut bucket);
        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            RateDecision::Allow
        } else {
            RateDecision::Deny {
                retry_after: self.wait_for_one(bucket.tokens),
            }
        }
    }

    /// Whether a token is currently available, without consuming it
    #[must_use]
    pub fn would_allow(&self, host: &str) -> bool {
        match self.buckets.get_mut(host) {
            Some(mut bucket) => {
                self.refill(&mut bucket);
                bucket.tokens >= 1.0
            }
            // First contact: a fresh bucket starts full
            None => true,
        }
    }

    /// Time until the host has a full token
    #[must_use]
    pub fn wait_time(&self, host: &str) -> Duration {
        match self.buckets.get_mut(host) {
            Some(mut bucket) => {
                self.refill(&mut bucket);
                if bucket.tokens >= 1.0 {
                    Duration::ZERO
                } else {
                    self.wait_for_one(bucket.tokens)
                }
            }
            None => Duration::ZERO,
        }
    }

    /// Consume a token, sleeping as needed up to `max_wait`
    ///
    /// Returns false if the deadline passed without a token; the caller
    /// should surrender the entry and requeue it.
    pub async fn acquire(&self, host: &str, max_wait: Duration) -> bool {
        let deadline = Instant::now() + max_wait;
        loop {
            match self.check(host) {
                RateDecision::Allow => return true,
                RateDecision::Deny { retry_after } => {
                    let now = Instant::now();
                    if now >= deadline {
                        return false;
                    }
                    let sleep_for = retry_after.min(deadline.duration_since(now));
                    tokio::time::sleep(sleep_for.max(Duration::from_millis(10))).await;
                }
            }
        }
    }

    #[must_use]
    pub fn tracked_hosts(&self) -> usize {
        self.buckets.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn burst_is_consumed_then_denied() {
        let limiter = HostRateLimiter::new(60.0, 2.0);
        assert_eq!(limiter.check("example.test"), RateDecision::Allow);
        assert_eq!(limiter.check("example.test"), RateDecision::Allow);
        assert!(matches!(
            limiter.check("example.test"),
            RateDecision::Deny { .. }
        ));
    }

    #[test]
    fn denial_reports_sensible_wait() {
        // 60 rpm = 1 token per second
        let limiter = HostRateLimiter::new(60.0, 1.0);
        assert_eq!(limiter.check("example.test"), RateDecision::Allow);
        match limiter.check("example.test") {
            RateDecision::Deny { retry_after } => {
                assert!(retry_after <= Duration::from_secs(1));
                assert!(retry_after >= Duration::from_millis(500));
            }
            RateDecision::Allow => panic!("expected denial"),
        }
    }

    #[test]
    fn hosts_have_independent_buckets() {
        let limiter = HostRateLimiter::new(60.0, 1.0);
        assert_eq!(limiter.check("a.test"), RateDecision::Allow);
        assert_eq!(limiter.check("b.test"), RateDecision::Allow);
    }

    #[tokio::test]
    async fn acquire_waits_for_refill() {
        let limiter = HostRateLimiter::new(600.0, 1.0); // 10 tokens/sec
        assert!(limiter.acquire("a.test", Duration::from_secs(1)).await);
        let start = Instant::now();
        assert!(limiter.acquire("a.test", Duration::from_secs(1)).await);
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn acquire_gives_up_at_deadline() {
        let limiter = HostRateLimiter::new(6.0, 1.0); // 1 token per 10s
        assert!(limiter.acquire("a.test", Duration::from_secs(1)).await);
        assert!(
            !limiter
                .acquire("a.test", Duration::from_millis(100))
                .await
        );
    }
}
