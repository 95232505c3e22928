//! HTTP acquisition pipeline
//!
//! One reqwest client with keep-alive pooling serves every worker.
//! Conditional headers are replayed from the last seen response for the
//! URL; a 304 resolves to the previously stored body. All transport
//! failures map onto [`FetchError`] for the retry coordinator.

use dashmap::DashMap;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use crate::config::CrawlConfig;
use crate::events::{CrawlEvent, EventBus};
use crate::storage::ContentStore;

use super::crawl_types::{CacheValidators, FetchError, FetchResult, QueueEntry};
use super::retry::parse_retry_after;

pub struct FetchPipeline {
    client: reqwest::Client,
    config: Arc<CrawlConfig>,
    bus: Arc<EventBus>,
    store: Option<Arc<ContentStore>>,
    /// Validators observed this session, keyed by URL
    validators: DashMap<String, CacheValidators>,
}

impl FetchPipeline {
    pub fn new(
        config: Arc<CrawlConfig>,
        bus: Arc<EventBus>,
        store: Option<Arc<ContentStore>>,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent().to_string())
            .timeout(config.request_timeout())
            .read_timeout(config.read_timeout())
            .pool_max_idle_per_host(config.max_per_host_in_flight())
            .build()?;
        Ok(Self {
            client,
            config,
            bus,
            store,
            validators: DashMap::new(),
        })
    }

    /// Fetch one entry
    ///
    /// The caller has already cleared politeness (token acquired) and
    /// eligibility (decision = fetch) for this URL.
    pub async fn fetch(&self, entry: &QueueEntry) -> Result<FetchResult, FetchError> {
        self.bus.publish(CrawlEvent::Telemetry {
            kind: "request:start".to_string(),
            value: 1.0,
            unit: "request".to_string(),
            extras: serde_json::json!({ "url": entry.url, "depth": entry.depth }),
            timestamp: chrono::Utc::now(),
        });

        let started = Instant::now();
        let mut request = self.client.get(&entry.url);
        let known = self.known_validators(&entry.url).await;
        if let Some(etag) = &known.etag {
            request = request.header(reqwest::header::IF_NONE_MATCH, etag);
        }
        if let Some(last_modified) = &known.last_modified {
            request = request.header(reqwest::header::IF_MODIFIED_SINCE, last_modified);
        }

        let response = request
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(&e))?;

        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let headers = flatten_headers(response.headers());
        let validators = CacheValidators {
            etag: headers.get("etag").cloned(),
            last_modified: headers.get("last-modified").cloned(),
        };

        if status == 304 {
            let body = self.prior_body(&entry.url).await.unwrap_or_default();
            let sha = sha256_hex(&body);
            return Ok(FetchResult {
                url: entry.url.clone(),
                final_url,
                http_status: status,
                headers,
                bytes_downloaded: 0,
                elapsed_ms: started.elapsed().as_millis() as u64,
                not_modified: true,
                cache_validators: known,
                content_sha256: sha,
                body,
            });
        }

        if !(200..300).contains(&status) {
            let retry_after = headers
                .get("retry-after")
                .and_then(|v| parse_retry_after(v));
            return Err(FetchError::Http {
                status,
                retry_after,
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::from_reqwest(&e))?
            .to_vec();
        let elapsed_ms = started.elapsed().as_millis() as u64;
        let sha = sha256_hex(&body);

        if !validators.is_empty() {
            self.validators.insert(entry.url.clone(), validators.clone());
        }

        Ok(FetchResult {
            url: entry.url.clone(),
            final_url,
            http_status: status,
            headers,
            bytes_downloaded: body.len() as u64,
            elapsed_ms,
            not_modified: false,
            cache_validators: validators,
            content_sha256: sha,
            body,
        })
    }

    /// Validators for the URL: this session's first, then persisted ones
    async fn known_validators(&self, url: &str) -> CacheValidators {
        if let Some(known) = self.validators.get(url) {
            return known.clone();
        }
        if let Some(store) = &self.store
            && let Ok(Some(validators)) = store.validators_for(url).await
        {
            return validators;
        }
        CacheValidators::default()
    }

    async fn prior_body(&self, url: &str) -> Option<Vec<u8>> {
        let store = self.store.as_ref()?;
        match store.cached_body(url).await {
            Ok(body) => body,
            Err(e) => {
                log::debug!("prior body lookup failed for {url}: {e}");
                None
            }
        }
    }
}

fn flatten_headers(headers: &reqwest::header::HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
        })
        .collect()
}

/// Hex sha256 of a byte slice
#[must_use]
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Extract out-link candidates from an HTML body
///
/// Regex-based href scan, bounded by `max`; callers absolutize and run
/// each candidate through its own decision.
#[must_use]
pub fn extract_links(body: &str, base_url: &str, max: usize) -> Vec<String> {
    static HREF_RE: once_cell::sync::Lazy<regex::Regex> = once_cell::sync::Lazy::new(|| {
        regex::Regex::new(r#"(?i)href\s*=\s*["']([^"'#]+)"#).expect("href pattern is valid")
    });

    let mut seen = std::collections::HashSet::new();
    let mut links = Vec::new();
    for capture in HREF_RE.captures_iter(body) {
        if links.len() >= max {
            break;
        }
        let href = capture[1].trim();
        if href.is_empty()
            || href.starts_with("javascript:")
            || href.starts_with("mailto:")
            || href.starts_with("data:")
        {
            continue;
        }
        if let Some(absolute) = crate::decision::absolutize(base_url, href)
            && seen.insert(absolute.clone())
        {
            links.push(absolute);
        }
    }
    links
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_hex_matches_known_digest() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn extract_links_absolutizes_and_dedups() {
        let html = r#"
            <a href="/world/a">A</a>
            <a href="/world/a">dup</a>
            <a href="https://other.test/x">ext</a>
            <a href="mailto:x@example.test">mail</a>
        "#;
        let links = extract_links(html, "https://example.test/", 10);
        assert_eq!(
            links,
            vec![
                "https://example.test/world/a".to_string(),
                "https://other.test/x".to_string(),
            ]
        );
    }

    #[test]
    fn extract_links_respects_cap() {
        let html: String = (0..20)
            .map(|i| format!("<a href=\"/p/{i}\">x</a>"))
            .collect();
        assert_eq!(extract_links(&html, "https://example.test/", 5).len(), 5);
    }
}
