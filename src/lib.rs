//! Politeness-aware news crawler
//!
//! A single-process crawl engine with per-host rate limiting, a
//! hierarchical planner that learns site structure across runs, a
//! decision-tree page classifier, and content-addressed compressed
//! storage. The [`crawl_engine::CrawlLoop`] ties the pieces together;
//! [`sequence::OperationsFacade`] exposes the named high-level
//! operations that wrap it.

pub mod classify;
pub mod config;
pub mod context;
pub mod crawl_engine;
pub mod decision;
pub mod events;
pub mod planner;
pub mod robots;
pub mod sequence;
pub mod storage;

pub use classify::{Classification, DecisionTreeClassifier, PageContext};
pub use config::{CrawlConfig, CrawlConfigBuilder, RobotsFailurePolicy, UseCase};
pub use context::{ContextError, CrawlContext, CrawlStats, StatsSnapshot, UrlState};
pub use crawl_engine::{
    CrawlControl, CrawlLoop, CrawlSummary, FetchError, FetchPipeline, FetchResult,
    HostRateLimiter, QueueEntry, QueueManager, RetryCoordinator,
};
pub use decision::{Decision, DecisionAction, DecisionInput, UrlDecisionOrchestrator};
pub use events::{CrawlEvent, CrawlStatus, EventBus, EventHandler, Severity};
pub use planner::{CrawlPlan, PlanTracker, Planner};
pub use robots::RobotsCache;
pub use sequence::{
    Operation, OperationsFacade, SequenceConfigLoader, SequenceRequest, SequenceRunner,
};
pub use storage::{Codec, ContentStore, StorageError};
