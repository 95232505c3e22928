//! Broadcast event bus for crawl telemetry
//!
//! Emission is synchronous: `publish` hands the event to the underlying
//! broadcast channel and returns immediately. Slow or failing subscribers
//! never stall a publisher; a lagging receiver loses the oldest events and
//! the loss shows up in the metrics, not in the crawl loop.

use tokio::sync::broadcast;

use super::metrics::EventBusMetrics;
use super::types::CrawlEvent;

/// Errors surfaced by bus operations
#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("no active subscribers")]
    NoSubscribers,
}

/// Pub/sub hub for [`CrawlEvent`]s
///
/// Cheap to share behind an `Arc`; every component that mutates crawl state
/// holds one and publishes through it.
#[derive(Debug)]
pub struct EventBus {
    sender: broadcast::Sender<CrawlEvent>,
    metrics: EventBusMetrics,
}

impl EventBus {
    /// Create a bus buffering up to `capacity` undelivered events per subscriber
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            metrics: EventBusMetrics::new(),
        }
    }

    /// Publish an event to all current subscribers
    ///
    /// Returns the number of subscribers that will observe the event.
    /// Publishing with no subscribers is counted as dropped but is not an
    /// error for the caller; crawl progress must not depend on listeners.
    pub fn publish(&self, event: CrawlEvent) -> usize {
        match self.sender.send(event) {
            Ok(subscriber_count) => {
                self.metrics.increment_published();
                self.metrics.update_subscriber_count(subscriber_count);
                subscriber_count
            }
            Err(_) => {
                self.metrics.increment_published();
                self.metrics.increment_dropped();
                self.metrics.update_subscriber_count(0);
                0
            }
        }
    }

    /// Publish, reporting no-subscriber delivery as an error
    ///
    /// Used by surfaces (e.g. the line-protocol handler) that need to know
    /// whether anything is listening.
    pub fn try_publish(&self, event: CrawlEvent) -> Result<usize, EventBusError> {
        match self.sender.send(event) {
            Ok(count) => {
                self.metrics.increment_published();
                self.metrics.update_subscriber_count(count);
                Ok(count)
            }
            Err(_) => {
                self.metrics.increment_failed();
                Err(EventBusError::NoSubscribers)
            }
        }
    }

    /// Subscribe to all events from this point forward
    ///
    /// Dropping the receiver is the unsubscribe.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<CrawlEvent> {
        self.sender.subscribe()
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    #[must_use]
    pub fn has_subscribers(&self) -> bool {
        self.sender.receiver_count() > 0
    }

    #[must_use]
    pub fn metrics(&self) -> &EventBusMetrics {
        &self.metrics
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::types::CrawlEvent;

    #[tokio::test]
    async fn publish_without_subscribers_counts_drop() {
        let bus = EventBus::new(8);
        let delivered = bus.publish(CrawlEvent::url_skipped(
            "https://example.test/a".into(),
            "already-visited".into(),
        ));
        assert_eq!(delivered, 0);
        let snap = bus.metrics().snapshot();
        assert_eq!(snap.events_published, 1);
        assert_eq!(snap.events_dropped, 1);
    }

    #[tokio::test]
    async fn subscriber_receives_published_event() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        bus.publish(CrawlEvent::url_queued("https://example.test/".into(), 0, 0));
        let event = rx.recv().await.unwrap();
        assert_eq!(event.name(), "url:queued");
    }
}
