//! Core configuration types for crawl jobs
//!
//! `CrawlConfig` carries every politeness, retry, planning, and storage
//! knob the engine reads. Construct it through the builder, which
//! validates and normalizes.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Storage tier that drives compression selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UseCase {
    /// Hot path, cheapest codecs
    Realtime,
    /// Balanced default
    Standard,
    /// Favor ratio over speed
    High,
    /// Cold data, maximum ratio
    Archival,
}

/// What to do when robots.txt cannot be fetched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RobotsFailurePolicy {
    AllowAll,
    DenyAll,
}

/// Main configuration for a crawl job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlConfig {
    pub(crate) start_url: String,
    pub(crate) job_id: String,
    pub(crate) data_dir: PathBuf,
    pub(crate) db_path: PathBuf,
    pub(crate) user_agent: String,

    // Scope policy
    pub(crate) stay_on_domain: bool,
    pub(crate) skip_query_urls: bool,
    pub(crate) respect_robots: bool,
    pub(crate) robots_failure_policy: RobotsFailurePolicy,
    pub(crate) blocked_extensions: Vec<String>,
    pub(crate) max_depth: u16,
    pub(crate) max_pages: Option<u64>,

    // Worker pool
    pub(crate) concurrent_workers: usize,
    pub(crate) max_per_host_in_flight: usize,

    // Politeness
    pub(crate) requests_per_minute: f64,
    pub(crate) burst_size: f64,
    pub(crate) token_wait_max_ms: u64,

    // HTTP
    pub(crate) request_timeout_ms: u64,
    pub(crate) read_timeout_ms: u64,

    // Retry policy
    pub(crate) max_retries: u8,
    pub(crate) retry_base_delay_ms: u64,
    pub(crate) retry_max_delay_ms: u64,
    pub(crate) retry_jitter_factor: f64,
    pub(crate) throttle_duration_ms: u64,
    pub(crate) host_max_errors: u32,
    pub(crate) host_window_ms: u64,
    pub(crate) host_lockout_ms: u64,

    // Decision layer
    pub(crate) decision_cache_capacity: usize,
    pub(crate) decision_cache_ttl_ms: u64,
    pub(crate) cache_freshness_hours: i64,

    // Planner
    pub(crate) adaptive_sizing: bool,
    pub(crate) adaptive_branching: bool,
    pub(crate) cross_domain_sharing: bool,

    // Storage
    pub(crate) use_case: UseCase,
    pub(crate) bucket_cache_capacity: usize,

    // Progress cadence
    pub(crate) progress_interval_ms: u64,
    pub(crate) progress_every_fetches: u64,

    // Discovery bounds
    pub(crate) max_links_per_page: usize,
    pub(crate) sitemap_seed_limit: usize,

    /// Decision-tree classifier configuration, if classification is wanted
    pub(crate) classifier_config: Option<serde_json::Value>,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            start_url: String::new(),
            job_id: String::new(),
            data_dir: PathBuf::from("./data"),
            db_path: PathBuf::from("./data/news.db"),
            user_agent: concat!("newscrawl/", env!("CARGO_PKG_VERSION")).to_string(),
            stay_on_domain: true,
            skip_query_urls: false,
            respect_robots: true,
            robots_failure_policy: RobotsFailurePolicy::AllowAll,
            blocked_extensions: default_blocked_extensions(),
            max_depth: 3,
            max_pages: None,
            concurrent_workers: 4,
            max_per_host_in_flight: 2,
            requests_per_minute: 60.0,
            burst_size: 3.0,
            token_wait_max_ms: 15_000,
            request_timeout_ms: 30_000,
            read_timeout_ms: 10_000,
            max_retries: 3,
            retry_base_delay_ms: 1_000,
            retry_max_delay_ms: 30_000,
            retry_jitter_factor: 0.2,
            throttle_duration_ms: 5_000,
            host_max_errors: 5,
            host_window_ms: 60_000,
            host_lockout_ms: 300_000,
            decision_cache_capacity: 50_000,
            decision_cache_ttl_ms: 300_000,
            cache_freshness_hours: 24,
            adaptive_sizing: true,
            adaptive_branching: true,
            cross_domain_sharing: true,
            use_case: UseCase::Standard,
            bucket_cache_capacity: 10,
            progress_interval_ms: 5_000,
            progress_every_fetches: 50,
            max_links_per_page: 200,
            sitemap_seed_limit: 100,
            classifier_config: None,
        }
    }
}

pub(crate) fn default_blocked_extensions() -> Vec<String> {
    [".pdf", ".jpg", ".png", ".gif", ".zip", ".mp4", ".mp3"]
        .iter()
        .map(|s| (*s).to_string())
        .collect()
}

impl CrawlConfig {
    /// Start building a config; `start_url` is the only required field
    #[must_use]
    pub fn builder() -> super::builder::CrawlConfigBuilder {
        super::builder::CrawlConfigBuilder::default()
    }
}
