//! Offline queue for producer-bound messages.
//!
//! While no producer is connected, viewer `prompt`/`resize` messages wait
//! here. The queue is:
//! - FIFO, so the producer sees input in the order it was typed
//! - bounded, evicting the oldest entry when full
//! - age-bounded, dropping entries older than `max_age`
//!
//! Pruning is lazy: it happens on [`enqueue`](OfflineQueue::enqueue) and
//! [`drain`](OfflineQueue::drain) only.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Default maximum number of queued messages.
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Default maximum age of a queued message (5 minutes).
pub const DEFAULT_QUEUE_MAX_AGE: Duration = Duration::from_secs(5 * 60);

/// A message waiting for the producer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedMessage<T> {
    /// The message itself.
    pub payload: T,
    /// When it was queued.
    pub enqueued_at: Instant,
}

/// Bounded, age-bounded FIFO.
#[derive(Debug)]
pub struct OfflineQueue<T> {
    capacity: usize,
    max_age: Duration,
    entries: VecDeque<QueuedMessage<T>>,
}

impl<T> OfflineQueue<T> {
    /// Create a queue with the given bounds.
    pub fn new(capacity: usize, max_age: Duration) -> Self {
        Self {
            capacity,
            max_age,
            entries: VecDeque::with_capacity(capacity.min(DEFAULT_QUEUE_CAPACITY)),
        }
    }

    /// Add a message, evicting the oldest entries if the queue is full.
    ///
    /// Returns the number of entries dropped (expired or evicted).
    pub fn enqueue(&mut self, payload: T, now: Instant) -> usize {
        let mut dropped = self.prune(now);

        if self.capacity == 0 {
            return dropped + 1;
        }

        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
            dropped += 1;
        }

        self.entries.push_back(QueuedMessage {
            payload,
            enqueued_at: now,
        });
        dropped
    }

    /// Remove and return every live entry in original order.
    pub fn drain(&mut self, now: Instant) -> Vec<T> {
        self.prune(now);
        self.entries.drain(..).map(|entry| entry.payload).collect()
    }

    /// Drop entries older than `max_age`. Returns how many were dropped.
    fn prune(&mut self, now: Instant) -> usize {
        let before = self.entries.len();
        let max_age = self.max_age;
        self.entries
            .retain(|entry| now.saturating_duration_since(entry.enqueued_at) <= max_age);
        before - self.entries.len()
    }

    /// Number of queued entries (including any not yet pruned).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum number of entries.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Maximum entry age.
    pub fn max_age(&self) -> Duration {
        self.max_age
    }
}

impl<T> Default for OfflineQueue<T> {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY, DEFAULT_QUEUE_MAX_AGE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_preserves_order() {
        let now = Instant::now();
        let mut queue = OfflineQueue::default();

        queue.enqueue("a", now);
        queue.enqueue("b", now);
        queue.enqueue("c", now);

        assert_eq!(queue.drain(now), vec!["a", "b", "c"]);
        assert!(queue.is_empty());
    }

    #[test]
    fn overflow_keeps_most_recent() {
        let now = Instant::now();
        let mut queue = OfflineQueue::default();

        for i in 0..150 {
            queue.enqueue(i, now);
        }

        assert_eq!(queue.len(), 100);
        assert_eq!(queue.drain(now), (50..150).collect::<Vec<_>>());
    }

    #[test]
    fn overflow_reports_evictions() {
        let now = Instant::now();
        let mut queue = OfflineQueue::new(2, DEFAULT_QUEUE_MAX_AGE);

        assert_eq!(queue.enqueue(1, now), 0);
        assert_eq!(queue.enqueue(2, now), 0);
        assert_eq!(queue.enqueue(3, now), 1);
        assert_eq!(queue.drain(now), vec![2, 3]);
    }

    #[test]
    fn stale_entry_dropped_at_drain() {
        let start = Instant::now();
        let mut queue = OfflineQueue::default();

        queue.enqueue("old", start);
        let later = start + Duration::from_secs(6 * 60);

        assert!(queue.drain(later).is_empty());
    }

    #[test]
    fn stale_entries_pruned_at_enqueue() {
        let start = Instant::now();
        let mut queue = OfflineQueue::default();

        queue.enqueue("old", start);
        let later = start + Duration::from_secs(6 * 60);
        assert_eq!(queue.enqueue("new", later), 1);

        assert_eq!(queue.len(), 1);
        assert_eq!(queue.drain(later), vec!["new"]);
    }

    #[test]
    fn entry_at_exact_max_age_survives() {
        let start = Instant::now();
        let mut queue = OfflineQueue::default();

        queue.enqueue("edge", start);
        assert_eq!(queue.drain(start + DEFAULT_QUEUE_MAX_AGE), vec!["edge"]);
    }

    #[test]
    fn drain_keeps_young_entries_only() {
        let start = Instant::now();
        let mut queue = OfflineQueue::default();

        queue.enqueue(1, start);
        queue.enqueue(2, start + Duration::from_secs(4 * 60));

        let now = start + Duration::from_secs(6 * 60);
        assert_eq!(queue.drain(now), vec![2]);
    }

    #[test]
    fn zero_capacity_drops_everything() {
        let now = Instant::now();
        let mut queue = OfflineQueue::new(0, DEFAULT_QUEUE_MAX_AGE);

        assert_eq!(queue.enqueue("x", now), 1);
        assert!(queue.is_empty());
    }
}
