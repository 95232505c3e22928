//! Priority queue with deferral ring and per-domain quotas
//!
//! Pop order is priority-major, FIFO within a priority. Re-enqueueing a
//! live URL with a higher priority promotes it (lazy-delete in the heap,
//! so promotion never duplicates delivery). Entries whose host is not
//! ready are passed over and aged by a one-point priority bonus so they
//! cannot starve.

use parking_lot::Mutex;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::time::{Duration, Instant};

use super::crawl_types::QueueEntry;

#[derive(Debug)]
struct HeapItem {
    priority: i32,
    seq: u64,
    entry: QueueEntry,
}

impl PartialEq for HeapItem {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for HeapItem {}

impl PartialOrd for HeapItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapItem {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max-heap: higher priority first, then earlier seq (FIFO)
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Default)]
struct Inner {
    heap: BinaryHeap<HeapItem>,
    /// url -> current effective priority for every live (heap or
    /// deferred) entry; the heap's source of truth for staleness
    best: HashMap<String, i32>,
    deferred: Vec<(Instant, QueueEntry)>,
    deferred_urls: HashSet<String>,
    per_host_live: HashMap<String, usize>,
    in_flight: HashMap<String, usize>,
    seq: u64,
}

impl Inner {
    fn push_item(&mut self, priority: i32, entry: QueueEntry) {
        self.seq += 1;
        self.heap.push(HeapItem {
            priority,
            seq: self.seq,
            entry,
        });
    }

    fn release_due_deferred(&mut self, now: Instant) {
        if self.deferred.is_empty() {
            return;
        }
        let mut still_waiting = Vec::with_capacity(self.deferred.len());
        let drained: Vec<_> = self.deferred.drain(..).collect();
        for (due, entry) in drained {
            if due <= now {
                self.deferred_urls.remove(&entry.url);
                let priority = self.best.get(&entry.url).copied().unwrap_or(entry.priority);
                *self.per_host_live.entry(entry.host.clone()).or_default() += 1;
                self.push_item(priority, entry);
            } else {
                still_waiting.push((due, entry));
            }
        }
        self.deferred = still_waiting;
    }
}

pub struct QueueManager {
    inner: Mutex<Inner>,
    per_domain_quota: usize,
}

impl QueueManager {
    #[must_use]
    pub fn new(per_domain_quota: usize) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            per_domain_quota: per_domain_quota.max(1),
        }
    }

    /// Insert an entry, or promote the live entry's priority
    ///
    /// Returns false when the URL is already live at an equal or higher
    /// priority (the caller's state layer handles visited/queued dedup).
    pub fn enqueue(&self, entry: QueueEntry) -> bool {
        let mut inner = self.inner.lock();
        match inner.best.get(&entry.url).copied() {
            Some(existing) if entry.priority <= existing => false,
            Some(_) => {
                // Promotion: record the higher priority and push a fresh
                // heap item; the older one goes stale.
                inner.best.insert(entry.url.clone(), entry.priority);
                if !inner.deferred_urls.contains(&entry.url) {
                    let priority = entry.priority;
                    inner.push_item(priority, entry);
                }
                true
            }
            None => {
                inner.best.insert(entry.url.clone(), entry.priority);
                *inner.per_host_live.entry(entry.host.clone()).or_default() += 1;
                let priority = entry.priority;
                inner.push_item(priority, entry);
                true
            }
        }
    }

    /// Pop the best entry whose host is ready and under quota
    ///
    /// Entries passed over (host busy or not ready) are re-queued with a
    /// one-point priority bonus.
    pub fn next<F: Fn(&str) -> bool>(&self, host_ready: F) -> Option<QueueEntry> {
        let mut inner = self.inner.lock();
        inner.release_due_deferred(Instant::now());

        let mut passed_over: Vec<HeapItem> = Vec::new();
        let mut selected: Option<QueueEntry> = None;

        while let Some(item) = inner.heap.pop() {
            // Stale heap items (promoted or already delivered) are dropped
            match inner.best.get(&item.entry.url) {
                Some(best) if *best == item.priority => {}
                _ => continue,
            }
            if inner.deferred_urls.contains(&item.entry.url) {
                continue;
            }

            let host = item.entry.host.clone();
            let at_quota =
                inner.in_flight.get(&host).copied().unwrap_or(0) >= self.per_domain_quota;
            if at_quota || !host_ready(&host) {
                passed_over.push(item);
                continue;
            }

            inner.best.remove(&item.entry.url);
            if let Some(count) = inner.per_host_live.get_mut(&host) {
                *count = count.saturating_sub(1);
            }
            *inner.in_flight.entry(host).or_default() += 1;
            selected = Some(item.entry);
            break;
        }

        for mut item in passed_over {
            let aged = item.priority + 1;
            item.priority = aged;
            item.entry.priority = aged;
            inner.best.insert(item.entry.url.clone(), aged);
            let entry = item.entry;
            inner.push_item(aged, entry);
        }

        selected
    }

    /// Park an entry for `delay`; it re-enters the live queue when due
    pub fn defer(&self, entry: QueueEntry, delay: Duration) {
        let mut inner = self.inner.lock();
        inner.best.insert(entry.url.clone(), entry.priority);
        inner.deferred_urls.insert(entry.url.clone());
        inner.deferred.push((Instant::now() + delay, entry));
    }

    /// Release the in-flight slot held for `host`
    pub fn complete(&self, host: &str) {
        let mut inner = self.inner.lock();
        if let Some(count) = inner.in_flight.get_mut(host) {
            *count = count.saturating_sub(1);
        }
    }

    /// Live + deferred entries
    #[must_use]
    pub fn size(&self) -> usize {
        let inner = self.inner.lock();
        inner.best.len()
    }

    #[must_use]
    pub fn size_by_domain(&self, host: &str) -> usize {
        let inner = self.inner.lock();
        let live = inner.per_host_live.get(host).copied().unwrap_or(0);
        let deferred = inner
            .deferred
            .iter()
            .filter(|(_, e)| e.host == host)
            .count();
        live + deferred
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().best.is_empty()
    }

    /// Entries currently parked in the deferral ring
    #[must_use]
    pub fn deferred_len(&self) -> usize {
        self.inner.lock().deferred.len()
    }

    /// Earliest time a deferred entry becomes due, if any
    #[must_use]
    pub fn next_deferred_due(&self) -> Option<Instant> {
        self.inner.lock().deferred.iter().map(|(due, _)| *due).min()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(url: &str, priority: i32) -> QueueEntry {
        QueueEntry {
            url: url.to_string(),
            host: "example.test".to_string(),
            depth: 0,
            priority,
            discovered_at: chrono::Utc::now(),
            referrer: None,
            retry_count: 0,
        }
    }

    #[test]
    fn pops_priority_major_fifo_within() {
        let queue = QueueManager::new(8);
        queue.enqueue(entry("https://example.test/low", 0));
        queue.enqueue(entry("https://example.test/high", 10));
        queue.enqueue(entry("https://example.test/low2", 0));

        assert_eq!(
            queue.next(|_| true).unwrap().url,
            "https://example.test/high"
        );
        assert_eq!(
            queue.next(|_| true).unwrap().url,
            "https://example.test/low"
        );
        assert_eq!(
            queue.next(|_| true).unwrap().url,
            "https://example.test/low2"
        );
        assert!(queue.next(|_| true).is_none());
    }

    #[test]
    fn reenqueue_promotes_without_duplicating() {
        let queue = QueueManager::new(8);
        queue.enqueue(entry("https://example.test/a", 1));
        queue.enqueue(entry("https://example.test/b", 5));
        assert!(queue.enqueue(entry("https://example.test/a", 9)));

        assert_eq!(queue.next(|_| true).unwrap().url, "https://example.test/a");
        assert_eq!(queue.next(|_| true).unwrap().url, "https://example.test/b");
        assert!(queue.next(|_| true).is_none());
    }

    #[test]
    fn lower_priority_reenqueue_is_noop() {
        let queue = QueueManager::new(8);
        queue.enqueue(entry("https://example.test/a", 5));
        assert!(!queue.enqueue(entry("https://example.test/a", 1)));
        assert_eq!(queue.size(), 1);
    }

    #[test]
    fn deferred_entries_return_after_delay() {
        let queue = QueueManager::new(8);
        queue.defer(entry("https://example.test/later", 0), Duration::from_millis(20));
        assert!(queue.next(|_| true).is_none());
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(
            queue.next(|_| true).unwrap().url,
            "https://example.test/later"
        );
    }

    #[test]
    fn not_ready_hosts_are_passed_over_and_aged() {
        let queue = QueueManager::new(8);
        queue.enqueue(entry("https://example.test/a", 3));
        assert!(queue.next(|_| false).is_none());
        // aged by one point while passed over
        let popped = queue.next(|_| true).unwrap();
        assert_eq!(popped.priority, 4);
    }

    #[test]
    fn quota_caps_in_flight_per_host() {
        let queue = QueueManager::new(1);
        queue.enqueue(entry("https://example.test/a", 0));
        queue.enqueue(entry("https://example.test/b", 0));

        let first = queue.next(|_| true).unwrap();
        // second pop blocked by quota until complete() releases the slot
        assert!(queue.next(|_| true).is_none());
        queue.complete(&first.host);
        assert!(queue.next(|_| true).is_some());
    }
}
