//! Crawl event system: bus, event taxonomy, line-protocol handler

pub mod bus;
pub mod handler;
pub mod metrics;
pub mod types;

pub use bus::{EventBus, EventBusError};
pub use handler::{EventHandler, LineOutcome};
pub use metrics::{EventBusMetrics, MetricsSnapshot};
pub use types::{CrawlEvent, CrawlStatus, QueueOperation, Severity};
