//! URL decision orchestration
//!
//! A single call, [`UrlDecisionOrchestrator::decide`], unifies syntax,
//! policy, state, resource, and cache checks into one verdict per URL.
//! Checks
//! run in a fixed order and the first failing check wins. A failing check
//! never raises; it yields a structured [`Decision`].

pub mod cache;
pub mod types;

use std::sync::Arc;
use std::time::Duration;

use crate::config::CrawlConfig;
use crate::context::CrawlContext;
use crate::robots::RobotsCache;
use crate::storage::ContentStore;

pub use cache::DecisionCache;
pub use types::{DecideIntent, Decision, DecisionAction, DecisionInput};

/// Normalize a URL for identity: parsed, lowercased scheme and host,
/// fragment stripped. Returns `None` for anything unparseable or
/// non-http(s).
#[must_use]
pub fn normalize_url(raw: &str) -> Option<String> {
    let mut parsed = url::Url::parse(raw).ok()?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return None;
    }
    parsed.host_str()?;
    parsed.set_fragment(None);
    Some(parsed.to_string())
}

/// Resolve a possibly-relative href against a base URL and normalize it
#[must_use]
pub fn absolutize(base: &str, href: &str) -> Option<String> {
    let base = url::Url::parse(base).ok()?;
    let joined = base.join(href).ok()?;
    normalize_url(joined.as_str())
}

/// Lowercased host of a normalized URL, keeping any explicit port
#[must_use]
pub fn host_of(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let host = parsed.host_str()?.to_ascii_lowercase();
    Some(match parsed.port() {
        Some(port) => format!("{host}:{port}"),
        None => host,
    })
}

pub struct UrlDecisionOrchestrator {
    config: Arc<CrawlConfig>,
    context: Arc<CrawlContext>,
    robots: Arc<RobotsCache>,
    store: Option<Arc<ContentStore>>,
    cache: DecisionCache,
    start_host: String,
}

impl UrlDecisionOrchestrator {
    #[must_use]
    pub fn new(
        config: Arc<CrawlConfig>,
        context: Arc<CrawlContext>,
        robots: Arc<RobotsCache>,
        store: Option<Arc<ContentStore>>,
    ) -> Self {
        let cache = DecisionCache::new(
            config.decision_cache_capacity(),
            config.decision_cache_ttl(),
        );
        let start_host = config.start_host();
        Self {
            config,
            context,
            robots,
            store,
            cache,
            start_host,
        }
    }

    /// Produce a verdict for `raw_url`
    pub async fn decide(&self, raw_url: &str, input: &DecisionInput) -> Decision {
        // 1. Syntax
        let Some(url) = normalize_url(raw_url) else {
            return Decision::skip("invalid-url")
                .with_detail("url", serde_json::Value::String(raw_url.to_string()));
        };
        // host is guaranteed by normalize_url
        let Some(host) = host_of(&url) else {
            return Decision::skip("invalid-url");
        };

        if !input.force_recheck
            && let Some(cached) = self.cache.get(&url)
        {
            return adapt_for_intent(cached, input.intent);
        }

        let decision = self.evaluate(&url, &host, input).await;

        // Only verdicts that cannot go stale inside the TTL are cached:
        // syntax/policy skips and eligibility. State and resource verdicts
        // follow mutable state, and defers must expire with the throttle.
        if cacheable(&decision) {
            self.cache.put(&url, decision.clone());
        }
        let _ = self.context.record_decision(&url, decision.clone());

        adapt_for_intent(decision, input.intent)
    }

    async fn evaluate(&self, url: &str, host: &str, input: &DecisionInput) -> Decision {
        let parsed = match url::Url::parse(url) {
            Ok(p) => p,
            Err(_) => return Decision::skip("invalid-url"),
        };

        // 1. Syntax (continued): blocked path extensions
        let path = parsed.path().to_ascii_lowercase();
        if let Some(ext) = self
            .config
            .blocked_extensions()
            .iter()
            .find(|ext| path.ends_with(ext.as_str()))
        {
            return Decision::skip("invalid-url")
                .with_detail("blocked_extension", serde_json::Value::String(ext.clone()));
        }

        // 2. Policy
        if self.config.stay_on_domain() && !host_within(host, &self.start_host) {
            return Decision::skip("off-domain")
                .with_detail("host", serde_json::Value::String(host.to_string()));
        }
        if input.depth > self.config.max_depth() {
            return Decision::skip("max-depth")
                .with_detail("depth", serde_json::Value::from(input.depth));
        }
        if self.config.respect_robots() {
            if !self.robots.has_rules(host) {
                self.robots.ensure(parsed.scheme(), host).await;
            }
            if !self.robots.is_allowed(host, url) {
                return Decision::skip("robots-disallowed");
            }
        }
        if self.config.skip_query_urls() && parsed.query().is_some() {
            return Decision::skip("has-query-string");
        }

        // 3. State
        if self.context.is_visited(url) {
            return Decision::skip("already-visited");
        }
        match input.intent {
            DecideIntent::Enqueue => {
                if self.context.is_queued(url) {
                    return Decision::skip("already-queued");
                }
            }
            DecideIntent::Fetch => {
                // The popping worker holds the URL in flight; only a
                // *queued* state here means another owner.
                if self.context.url_state(url) == Some(crate::context::UrlState::Queued) {
                    return Decision::skip("already-queued");
                }
            }
        }

        // 4. Resource
        match self.context.domain_availability(host) {
            crate::context::domain::DomainAvailability::Blocked => {
                return Decision::skip("domain-blocked");
            }
            crate::context::domain::DomainAvailability::Throttled { remaining } => {
                let retry_after = if remaining.is_zero() {
                    self.config.throttle_duration()
                } else {
                    remaining
                };
                return Decision::defer("domain-throttled", retry_after);
            }
            crate::context::domain::DomainAvailability::Available => {}
        }
        if let Some(budget) = self.config.max_pages()
            && self.context.stats().visited() >= budget
        {
            return Decision::skip("budget-exceeded");
        }

        // 5. Cache (fetch intent only; an out-link with a fresh cache will
        // report the cache verdict when its own fetch turn comes)
        if input.intent == DecideIntent::Fetch
            && !input.force_recheck
            && let Some(store) = &self.store
        {
            match store
                .fresh_cached_body(url, self.config.cache_freshness_hours())
                .await
            {
                Ok(Some(body)) => {
                    let mut decision = Decision::new(DecisionAction::Cache, "fresh-cache");
                    decision.cached_data = Some(Arc::new(body));
                    return decision;
                }
                Ok(None) => {}
                Err(e) => {
                    // A cache lookup failure must not fail the URL
                    log::debug!("cache lookup failed for {url}: {e}");
                }
            }
        }

        Decision::new(DecisionAction::Fetch, "eligible")
    }
}

/// True when `host` equals the start host or is one of its subdomains
fn host_within(host: &str, start_host: &str) -> bool {
    if start_host.is_empty() {
        return true;
    }
    host == start_host || host.ends_with(&format!(".{start_host}"))
}

fn cacheable(decision: &Decision) -> bool {
    match decision.action {
        DecisionAction::Skip => matches!(
            decision.reason.as_str(),
            "invalid-url" | "off-domain" | "max-depth" | "robots-disallowed" | "has-query-string"
        ),
        DecisionAction::Fetch | DecisionAction::Queue => true,
        DecisionAction::Cache | DecisionAction::Defer => false,
    }
}

/// Eligible verdicts surface as `Fetch` or `Queue` depending on why the
/// caller asked
fn adapt_for_intent(mut decision: Decision, intent: DecideIntent) -> Decision {
    decision.action = match (decision.action, intent) {
        (DecisionAction::Fetch | DecisionAction::Queue, DecideIntent::Fetch) => {
            DecisionAction::Fetch
        }
        (DecisionAction::Fetch | DecisionAction::Queue, DecideIntent::Enqueue) => {
            DecisionAction::Queue
        }
        (other, _) => other,
    };
    decision
}

/// Default retry-after for throttled verdicts when nothing better is known
pub const DEFAULT_THROTTLE_RETRY: Duration = Duration::from_secs(5);
