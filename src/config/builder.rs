//! Builder for [`CrawlConfig`]
//!
//! The builder owns validation: a config that comes out of `build()` has a
//! parseable http(s) start URL, a generated job id when none was given, at
//! least one worker, and a positive request rate.

use std::path::PathBuf;

use super::types::{CrawlConfig, RobotsFailurePolicy, UseCase};

/// Errors produced by config validation
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("start_url is required")]
    MissingStartUrl,
    #[error("start_url is not a valid http(s) URL: {0}")]
    InvalidStartUrl(String),
    #[error("concurrent_workers must be at least 1")]
    NoWorkers,
    #[error("requests_per_minute must be positive")]
    NonPositiveRate,
    #[error("burst_size must be at least 1")]
    BurstTooSmall,
}

#[derive(Debug, Default)]
pub struct CrawlConfigBuilder {
    config: CrawlConfig,
}

impl CrawlConfigBuilder {
    #[must_use]
    pub fn start_url(mut self, url: impl Into<String>) -> Self {
        self.config.start_url = url.into();
        self
    }

    #[must_use]
    pub fn job_id(mut self, id: impl Into<String>) -> Self {
        self.config.job_id = id.into();
        self
    }

    #[must_use]
    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.data_dir = dir.into();
        self
    }

    #[must_use]
    pub fn db_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.db_path = path.into();
        self
    }

    #[must_use]
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.config.user_agent = agent.into();
        self
    }

    #[must_use]
    pub fn stay_on_domain(mut self, value: bool) -> Self {
        self.config.stay_on_domain = value;
        self
    }

    #[must_use]
    pub fn skip_query_urls(mut self, value: bool) -> Self {
        self.config.skip_query_urls = value;
        self
    }

    #[must_use]
    pub fn respect_robots(mut self, value: bool) -> Self {
        self.config.respect_robots = value;
        self
    }

    #[must_use]
    pub fn robots_failure_policy(mut self, policy: RobotsFailurePolicy) -> Self {
        self.config.robots_failure_policy = policy;
        self
    }

    #[must_use]
    pub fn blocked_extensions(mut self, exts: Vec<String>) -> Self {
        self.config.blocked_extensions = exts;
        self
    }

    #[must_use]
    pub fn max_depth(mut self, depth: u16) -> Self {
        self.config.max_depth = depth;
        self
    }

    #[must_use]
    pub fn max_pages(mut self, pages: Option<u64>) -> Self {
        self.config.max_pages = pages;
        self
    }

    #[must_use]
    pub fn concurrent_workers(mut self, workers: usize) -> Self {
        self.config.concurrent_workers = workers;
        self
    }

    #[must_use]
    pub fn max_per_host_in_flight(mut self, count: usize) -> Self {
        self.config.max_per_host_in_flight = count.max(1);
        self
    }

    #[must_use]
    pub fn requests_per_minute(mut self, rpm: f64) -> Self {
        self.config.requests_per_minute = rpm;
        self
    }

    #[must_use]
    pub fn burst_size(mut self, burst: f64) -> Self {
        self.config.burst_size = burst;
        self
    }

    #[must_use]
    pub fn token_wait_max_ms(mut self, ms: u64) -> Self {
        self.config.token_wait_max_ms = ms;
        self
    }

    #[must_use]
    pub fn request_timeout_ms(mut self, ms: u64) -> Self {
        self.config.request_timeout_ms = ms;
        self
    }

    #[must_use]
    pub fn read_timeout_ms(mut self, ms: u64) -> Self {
        self.config.read_timeout_ms = ms;
        self
    }

    #[must_use]
    pub fn max_retries(mut self, retries: u8) -> Self {
        self.config.max_retries = retries;
        self
    }

    #[must_use]
    pub fn retry_base_delay_ms(mut self, ms: u64) -> Self {
        self.config.retry_base_delay_ms = ms;
        self
    }

    #[must_use]
    pub fn retry_max_delay_ms(mut self, ms: u64) -> Self {
        self.config.retry_max_delay_ms = ms;
        self
    }

    #[must_use]
    pub fn retry_jitter_factor(mut self, factor: f64) -> Self {
        self.config.retry_jitter_factor = factor;
        self
    }

    #[must_use]
    pub fn throttle_duration_ms(mut self, ms: u64) -> Self {
        self.config.throttle_duration_ms = ms;
        self
    }

    #[must_use]
    pub fn host_max_errors(mut self, count: u32) -> Self {
        self.config.host_max_errors = count;
        self
    }

    #[must_use]
    pub fn host_window_ms(mut self, ms: u64) -> Self {
        self.config.host_window_ms = ms;
        self
    }

    #[must_use]
    pub fn host_lockout_ms(mut self, ms: u64) -> Self {
        self.config.host_lockout_ms = ms;
        self
    }

    #[must_use]
    pub fn decision_cache_capacity(mut self, capacity: usize) -> Self {
        self.config.decision_cache_capacity = capacity;
        self
    }

    #[must_use]
    pub fn decision_cache_ttl_ms(mut self, ms: u64) -> Self {
        self.config.decision_cache_ttl_ms = ms;
        self
    }

    #[must_use]
    pub fn cache_freshness_hours(mut self, hours: i64) -> Self {
        self.config.cache_freshness_hours = hours;
        self
    }

    #[must_use]
    pub fn adaptive_sizing(mut self, value: bool) -> Self {
        self.config.adaptive_sizing = value;
        self
    }

    #[must_use]
    pub fn adaptive_branching(mut self, value: bool) -> Self {
        self.config.adaptive_branching = value;
        self
    }

    #[must_use]
    pub fn cross_domain_sharing(mut self, value: bool) -> Self {
        self.config.cross_domain_sharing = value;
        self
    }

    #[must_use]
    pub fn use_case(mut self, use_case: UseCase) -> Self {
        self.config.use_case = use_case;
        self
    }

    #[must_use]
    pub fn bucket_cache_capacity(mut self, capacity: usize) -> Self {
        self.config.bucket_cache_capacity = capacity;
        self
    }

    #[must_use]
    pub fn progress_interval_ms(mut self, ms: u64) -> Self {
        self.config.progress_interval_ms = ms;
        self
    }

    #[must_use]
    pub fn progress_every_fetches(mut self, count: u64) -> Self {
        self.config.progress_every_fetches = count;
        self
    }

    #[must_use]
    pub fn max_links_per_page(mut self, count: usize) -> Self {
        self.config.max_links_per_page = count;
        self
    }

    #[must_use]
    pub fn classifier_config(mut self, config: serde_json::Value) -> Self {
        self.config.classifier_config = Some(config);
        self
    }

    /// Validate and produce the final config
    pub fn build(mut self) -> Result<CrawlConfig, ConfigError> {
        if self.config.start_url.is_empty() {
            return Err(ConfigError::MissingStartUrl);
        }
        let parsed = url::Url::parse(&self.config.start_url)
            .map_err(|_| ConfigError::InvalidStartUrl(self.config.start_url.clone()))?;
        if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
            return Err(ConfigError::InvalidStartUrl(self.config.start_url.clone()));
        }
        if self.config.concurrent_workers == 0 {
            return Err(ConfigError::NoWorkers);
        }
        if self.config.requests_per_minute <= 0.0 {
            return Err(ConfigError::NonPositiveRate);
        }
        if self.config.burst_size < 1.0 {
            return Err(ConfigError::BurstTooSmall);
        }
        if self.config.job_id.is_empty() {
            self.config.job_id = generate_job_id(&self.config.start_url);
        }
        Ok(self.config)
    }
}

/// Job ids are host + start-time, readable in logs and unique enough for
/// the single-process job table
fn generate_job_id(start_url: &str) -> String {
    let host = url::Url::parse(start_url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| "job".to_string());
    format!("{}-{}", host, chrono::Utc::now().timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_requires_start_url() {
        let err = CrawlConfigBuilder::default().build().unwrap_err();
        assert!(matches!(err, ConfigError::MissingStartUrl));
    }

    #[test]
    fn build_rejects_non_http_scheme() {
        let err = CrawlConfig::builder()
            .start_url("ftp://example.test/")
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidStartUrl(_)));
    }

    #[test]
    fn build_generates_job_id() {
        let config = CrawlConfig::builder()
            .start_url("https://example.test/")
            .build()
            .unwrap();
        assert!(config.job_id().starts_with("example.test-"));
    }
}
