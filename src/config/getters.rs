//! Read accessors for [`CrawlConfig`]
//!
//! Fields stay crate-private; external callers read through these.

use std::path::Path;
use std::time::Duration;

use super::types::{CrawlConfig, RobotsFailurePolicy, UseCase};

impl CrawlConfig {
    #[must_use]
    pub fn start_url(&self) -> &str {
        &self.start_url
    }

    #[must_use]
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    #[must_use]
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    #[must_use]
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    #[must_use]
    pub fn stay_on_domain(&self) -> bool {
        self.stay_on_domain
    }

    #[must_use]
    pub fn skip_query_urls(&self) -> bool {
        self.skip_query_urls
    }

    #[must_use]
    pub fn respect_robots(&self) -> bool {
        self.respect_robots
    }

    #[must_use]
    pub fn robots_failure_policy(&self) -> RobotsFailurePolicy {
        self.robots_failure_policy
    }

    #[must_use]
    pub fn blocked_extensions(&self) -> &[String] {
        &self.blocked_extensions
    }

    #[must_use]
    pub fn max_depth(&self) -> u16 {
        self.max_depth
    }

    #[must_use]
    pub fn max_pages(&self) -> Option<u64> {
        self.max_pages
    }

    #[must_use]
    pub fn concurrent_workers(&self) -> usize {
        self.concurrent_workers
    }

    #[must_use]
    pub fn max_per_host_in_flight(&self) -> usize {
        self.max_per_host_in_flight
    }

    #[must_use]
    pub fn requests_per_minute(&self) -> f64 {
        self.requests_per_minute
    }

    #[must_use]
    pub fn burst_size(&self) -> f64 {
        self.burst_size
    }

    #[must_use]
    pub fn token_wait_max(&self) -> Duration {
        Duration::from_millis(self.token_wait_max_ms)
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    #[must_use]
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    #[must_use]
    pub fn max_retries(&self) -> u8 {
        self.max_retries
    }

    #[must_use]
    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    #[must_use]
    pub fn retry_max_delay(&self) -> Duration {
        Duration::from_millis(self.retry_max_delay_ms)
    }

    #[must_use]
    pub fn retry_jitter_factor(&self) -> f64 {
        self.retry_jitter_factor
    }

    #[must_use]
    pub fn throttle_duration(&self) -> Duration {
        Duration::from_millis(self.throttle_duration_ms)
    }

    #[must_use]
    pub fn host_max_errors(&self) -> u32 {
        self.host_max_errors
    }

    #[must_use]
    pub fn host_window(&self) -> Duration {
        Duration::from_millis(self.host_window_ms)
    }

    #[must_use]
    pub fn host_lockout(&self) -> Duration {
        Duration::from_millis(self.host_lockout_ms)
    }

    #[must_use]
    pub fn decision_cache_capacity(&self) -> usize {
        self.decision_cache_capacity
    }

    #[must_use]
    pub fn decision_cache_ttl(&self) -> Duration {
        Duration::from_millis(self.decision_cache_ttl_ms)
    }

    #[must_use]
    pub fn cache_freshness_hours(&self) -> i64 {
        self.cache_freshness_hours
    }

    #[must_use]
    pub fn adaptive_sizing(&self) -> bool {
        self.adaptive_sizing
    }

    #[must_use]
    pub fn adaptive_branching(&self) -> bool {
        self.adaptive_branching
    }

    #[must_use]
    pub fn cross_domain_sharing(&self) -> bool {
        self.cross_domain_sharing
    }

    #[must_use]
    pub fn use_case(&self) -> UseCase {
        self.use_case
    }

    #[must_use]
    pub fn bucket_cache_capacity(&self) -> usize {
        self.bucket_cache_capacity
    }

    #[must_use]
    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }

    #[must_use]
    pub fn progress_every_fetches(&self) -> u64 {
        self.progress_every_fetches
    }

    #[must_use]
    pub fn max_links_per_page(&self) -> usize {
        self.max_links_per_page
    }

    #[must_use]
    pub fn sitemap_seed_limit(&self) -> usize {
        self.sitemap_seed_limit
    }

    #[must_use]
    pub fn classifier_config(&self) -> Option<&serde_json::Value> {
        self.classifier_config.as_ref()
    }

    /// Host of the start URL, lowercased, keeping any explicit port
    #[must_use]
    pub fn start_host(&self) -> String {
        crate::decision::host_of(&self.start_url).unwrap_or_default()
    }
}
