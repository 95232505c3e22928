//! Crawl configuration

pub mod builder;
pub mod getters;
pub mod methods;
pub mod types;

pub use builder::{ConfigError, CrawlConfigBuilder};
pub use types::{CrawlConfig, RobotsFailurePolicy, UseCase};
