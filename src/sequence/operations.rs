//! Named high-level crawl operations
//!
//! A closed catalog; each operation wraps a crawl-loop invocation with a
//! preset option bundle. Effective overrides layer as
//! step > shared > preset > global config.

use futures::future::BoxFuture;
use serde_json::{Map, Value, json};
use std::str::FromStr;
use std::sync::Arc;

use crate::config::CrawlConfig;
use crate::crawl_engine::CrawlLoop;
use crate::events::EventBus;

use super::runner::OperationResolver;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Confirm known country/section hub URLs exist and are reachable
    EnsureCountryHubs,
    /// Breadth-first expansion from each known country hub
    ExploreCountryHubs,
    /// Refresh one hub, following historical-archive links
    CrawlCountryHubHistory,
    /// History refresh batched across all known country hubs
    CrawlCountryHubsHistory,
    /// Planner-driven hunt for topic section landing pages
    FindTopicHubs,
    /// Both hub families in one combined plan
    FindPlaceAndTopicHubs,
}

#[derive(Debug, thiserror::Error)]
#[error("unknown operation: {0}")]
pub struct UnknownOperation(pub String);

impl FromStr for Operation {
    type Err = UnknownOperation;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "EnsureCountryHubs" => Ok(Self::EnsureCountryHubs),
            "ExploreCountryHubs" => Ok(Self::ExploreCountryHubs),
            "CrawlCountryHubHistory" => Ok(Self::CrawlCountryHubHistory),
            "CrawlCountryHubsHistory" => Ok(Self::CrawlCountryHubsHistory),
            "FindTopicHubs" => Ok(Self::FindTopicHubs),
            "FindPlaceAndTopicHubs" => Ok(Self::FindPlaceAndTopicHubs),
            other => Err(UnknownOperation(other.to_string())),
        }
    }
}

impl Operation {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EnsureCountryHubs => "EnsureCountryHubs",
            Self::ExploreCountryHubs => "ExploreCountryHubs",
            Self::CrawlCountryHubHistory => "CrawlCountryHubHistory",
            Self::CrawlCountryHubsHistory => "CrawlCountryHubsHistory",
            Self::FindTopicHubs => "FindTopicHubs",
            Self::FindPlaceAndTopicHubs => "FindPlaceAndTopicHubs",
        }
    }

    #[must_use]
    pub fn all() -> &'static [Operation] {
        &[
            Self::EnsureCountryHubs,
            Self::ExploreCountryHubs,
            Self::CrawlCountryHubHistory,
            Self::CrawlCountryHubsHistory,
            Self::FindTopicHubs,
            Self::FindPlaceAndTopicHubs,
        ]
    }

    /// Preset option bundle for this operation
    #[must_use]
    pub fn preset(&self) -> Map<String, Value> {
        let preset = match self {
            // Seeds only: reachability, not discovery
            Self::EnsureCountryHubs => json!({
                "max_depth": 0,
                "max_pages": 64,
                "max_links_per_page": 0,
            }),
            Self::ExploreCountryHubs => json!({
                "max_depth": 2,
                "max_pages": 200,
            }),
            // History passes ignore the freshness cache
            Self::CrawlCountryHubHistory => json!({
                "max_depth": 3,
                "max_pages": 500,
                "cache_freshness_hours": 0,
            }),
            Self::CrawlCountryHubsHistory => json!({
                "max_depth": 3,
                "max_pages": 2000,
                "cache_freshness_hours": 0,
            }),
            Self::FindTopicHubs => json!({
                "max_depth": 2,
                "max_pages": 300,
                "adaptive_branching": true,
            }),
            Self::FindPlaceAndTopicHubs => json!({
                "max_depth": 2,
                "max_pages": 500,
                "adaptive_branching": true,
            }),
        };
        match preset {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }
}

/// Executes catalog operations as preset crawl loops
pub struct OperationsFacade {
    base_config: CrawlConfig,
    bus: Arc<EventBus>,
}

impl OperationsFacade {
    #[must_use]
    pub fn new(base_config: CrawlConfig, bus: Arc<EventBus>) -> Self {
        Self { base_config, bus }
    }

    /// Run one operation with merged overrides (already layered by the
    /// caller as shared < step)
    pub async fn execute(
        &self,
        operation: Operation,
        start_url: Option<&str>,
        overrides: &Map<String, Value>,
    ) -> anyhow::Result<crate::crawl_engine::CrawlSummary> {
        let mut config = self.base_config.apply_overrides(&operation.preset());
        config = config.apply_overrides(overrides);
        if let Some(start_url) = start_url {
            let mut start = Map::new();
            start.insert("start_url".to_string(), Value::String(start_url.to_string()));
            config = config.apply_overrides(&start);
        }

        log::info!(
            "operation {} on {} (depth {}, pages {:?})",
            operation.as_str(),
            config.start_url(),
            config.max_depth(),
            config.max_pages()
        );
        let crawl = CrawlLoop::new(config, Arc::clone(&self.bus));
        crawl.run().await
    }
}

impl OperationResolver for OperationsFacade {
    fn execute_operation<'a>(
        &'a self,
        operation: &'a str,
        start_url: Option<&'a str>,
        overrides: &'a Map<String, Value>,
    ) -> BoxFuture<'a, anyhow::Result<Value>> {
        Box::pin(async move {
            let operation = Operation::from_str(operation)?;
            let summary = self.execute(operation, start_url, overrides).await?;
            Ok(json!({
                "job_id": summary.job_id,
                "status": summary.status.as_str(),
                "visited": summary.stats.visited,
                "articles": summary.stats.articles,
                "errors": summary.stats.errors,
                "duration_ms": summary.duration.as_millis() as u64,
            }))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_names_round_trip() {
        for op in Operation::all() {
            assert_eq!(Operation::from_str(op.as_str()).unwrap(), *op);
        }
        assert!(Operation::from_str("MakeCoffee").is_err());
    }

    #[test]
    fn presets_are_object_bundles() {
        for op in Operation::all() {
            assert!(!op.preset().is_empty(), "{} preset empty", op.as_str());
        }
    }
}
