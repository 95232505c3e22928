//! robots.txt acquisition and rule checks
//!
//! Rules for a host are fetched at most once per job and are immutable
//! afterwards. A failed fetch falls back to the configured policy
//! (allow-all by default). Sitemap URLs named by robots.txt are kept for
//! the init stage's seed discovery.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;

use texting_robots::Robot;

use crate::config::{CrawlConfig, RobotsFailurePolicy};

const ROBOTS_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

enum RobotsEntry {
    Rules(Box<Robot>),
    AllowAll,
    DenyAll,
}

pub struct RobotsCache {
    client: reqwest::Client,
    user_agent: String,
    failure_policy: RobotsFailurePolicy,
    entries: DashMap<String, Arc<RobotsEntry>>,
}

impl RobotsCache {
    pub fn new(config: &CrawlConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent().to_string())
            .timeout(ROBOTS_FETCH_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            user_agent: config.user_agent().to_string(),
            failure_policy: config.robots_failure_policy(),
            entries: DashMap::new(),
        })
    }

    /// Parse and install rules for a host from raw robots.txt text
    ///
    /// Used by the fetch path and by callers that pre-seed rules.
    pub fn load_rules(&self, host: &str, robots_txt: &str) {
        let entry = match Robot::new(&self.user_agent, robots_txt.as_bytes()) {
            Ok(robot) => RobotsEntry::Rules(Box::new(robot)),
            Err(e) => {
                log::warn!("robots.txt for {host} failed to parse: {e}; falling back");
                self.failure_entry()
            }
        };
        self.entries.insert(host.to_string(), Arc::new(entry));
    }

    fn failure_entry(&self) -> RobotsEntry {
        match self.failure_policy {
            RobotsFailurePolicy::AllowAll => RobotsEntry::AllowAll,
            RobotsFailurePolicy::DenyAll => RobotsEntry::DenyAll,
        }
    }

    /// Fetch robots.txt for the host if not already cached
    pub async fn ensure(&self, scheme: &str, host: &str) {
        if self.entries.contains_key(host) {
            return;
        }
        let robots_url = format!("{scheme}://{host}/robots.txt");
        let fetched = self.client.get(&robots_url).send().await;
        let entry = match fetched {
            Ok(response) if response.status().is_success() => match response.text().await {
                Ok(body) => {
                    self.load_rules(host, &body);
                    return;
                }
                Err(e) => {
                    log::warn!("robots.txt body read failed for {host}: {e}");
                    self.failure_entry()
                }
            },
            Ok(response) => {
                log::debug!(
                    "robots.txt for {host} returned {}; applying failure policy",
                    response.status()
                );
                self.failure_entry()
            }
            Err(e) => {
                log::warn!("robots.txt fetch failed for {host}: {e}");
                self.failure_entry()
            }
        };
        self.entries.insert(host.to_string(), Arc::new(entry));
    }

    /// Whether the configured user-agent may fetch `url` on `host`
    ///
    /// Hosts with no cached entry are allowed; the crawl loop ensures the
    /// start host's rules during init, and lazily fetched hosts call
    /// [`ensure`](Self::ensure) first.
    #[must_use]
    pub fn is_allowed(&self, host: &str, url: &str) -> bool {
        match self.entries.get(host) {
            Some(entry) => match entry.value().as_ref() {
                RobotsEntry::Rules(robot) => robot.allowed(url),
                RobotsEntry::AllowAll => true,
                RobotsEntry::DenyAll => false,
            },
            None => true,
        }
    }

    /// Sitemap URLs declared by the host's robots.txt
    #[must_use]
    pub fn sitemaps(&self, host: &str) -> Vec<String> {
        match self.entries.get(host) {
            Some(entry) => match entry.value().as_ref() {
                RobotsEntry::Rules(robot) => robot.sitemaps.clone(),
                _ => Vec::new(),
            },
            None => Vec::new(),
        }
    }

    /// Crawl-delay requested by the host, if any
    #[must_use]
    pub fn crawl_delay(&self, host: &str) -> Option<Duration> {
        match self.entries.get(host) {
            Some(entry) => match entry.value().as_ref() {
                RobotsEntry::Rules(robot) => {
                    robot.delay.map(|secs| Duration::from_secs_f32(secs.max(0.0)))
                }
                _ => None,
            },
            None => None,
        }
    }

    #[must_use]
    pub fn has_rules(&self, host: &str) -> bool {
        self.entries.contains_key(host)
    }

    /// Whether the host's entry came from a parsed robots.txt (as
    /// opposed to a failure-policy fallback)
    #[must_use]
    pub fn has_parsed_rules(&self, host: &str) -> bool {
        self.entries
            .get(host)
            .is_some_and(|e| matches!(e.value().as_ref(), RobotsEntry::Rules(_)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache() -> RobotsCache {
        let config = CrawlConfig::builder()
            .start_url("https://example.test/")
            .build()
            .unwrap();
        RobotsCache::new(&config).unwrap()
    }

    #[test]
    fn loaded_rules_govern_paths() {
        let cache = cache();
        cache.load_rules(
            "example.test",
            "User-agent: *\nDisallow: /private/\nSitemap: https://example.test/sitemap.xml\n",
        );
        assert!(cache.is_allowed("example.test", "https://example.test/public/ok"));
        assert!(!cache.is_allowed("example.test", "https://example.test/private/secret"));
        assert_eq!(
            cache.sitemaps("example.test"),
            vec!["https://example.test/sitemap.xml".to_string()]
        );
    }

    #[test]
    fn unknown_host_is_allowed() {
        let cache = cache();
        assert!(cache.is_allowed("other.test", "https://other.test/anything"));
    }
}
