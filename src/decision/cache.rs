//! Bounded TTL cache for decisions
//!
//! LRU keyed by normalized URL. Entries expire after the configured TTL;
//! `force_recheck` bypasses the cache entirely at the orchestrator level.

use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use super::types::Decision;

pub struct DecisionCache {
    entries: Mutex<LruCache<String, (Instant, Decision)>>,
    ttl: Duration,
}

impl DecisionCache {
    #[must_use]
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    #[must_use]
    pub fn get(&self, url: &str) -> Option<Decision> {
        let mut entries = self.entries.lock();
        match entries.get(url) {
            Some((stored_at, decision)) if stored_at.elapsed() < self.ttl => {
                Some(decision.clone())
            }
            Some(_) => {
                entries.pop(url);
                None
            }
            None => None,
        }
    }

    pub fn put(&self, url: &str, decision: Decision) {
        self.entries
            .lock()
            .put(url.to_string(), (Instant::now(), decision));
    }

    pub fn invalidate(&self, url: &str) {
        self.entries.lock().pop(url);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::types::DecisionAction;

    #[test]
    fn expired_entries_are_dropped() {
        let cache = DecisionCache::new(4, Duration::from_millis(0));
        cache.put("https://a.test/", Decision::skip("already-visited"));
        assert!(cache.get("https://a.test/").is_none());
    }

    #[test]
    fn capacity_evicts_least_recently_used() {
        let cache = DecisionCache::new(2, Duration::from_secs(60));
        cache.put("https://a.test/", Decision::skip("a"));
        cache.put("https://b.test/", Decision::skip("b"));
        cache.put("https://c.test/", Decision::skip("c"));
        assert!(cache.get("https://a.test/").is_none());
        let b = cache.get("https://b.test/").unwrap();
        assert_eq!(b.action, DecisionAction::Skip);
    }
}
