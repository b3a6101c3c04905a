//! When each message was first delivered, kept only as long as duplicates are plausible.
//!
//! Entries leave the log either when they are older than the TTL (checked on
//! [`FirstSeenLog::prune_expired`]) or when an insert would exceed the capacity, in
//! which case the oldest entry is evicted.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use super::MessageId;

#[derive(Debug)]
pub(crate) struct FirstSeenLog {
    seen: HashMap<MessageId, Instant>,
    /// Insertion order, oldest first. Time sources are monotonic so this is also age order.
    order: VecDeque<(Instant, MessageId)>,
    ttl: Duration,
    capacity: usize,
}

impl FirstSeenLog {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            seen: HashMap::new(),
            order: VecDeque::new(),
            ttl,
            capacity,
        }
    }

    /// Records the first delivery of `id` at `now`.
    ///
    /// Returns `false` and leaves the log untouched if `id` is already present.
    pub fn insert(&mut self, id: MessageId, now: Instant) -> bool {
        if self.seen.contains_key(&id) {
            return false;
        }
        while self.seen.len() >= self.capacity {
            let Some((_, oldest)) = self.order.pop_front() else {
                break;
            };
            self.seen.remove(&oldest);
            tracing::trace!(message = %oldest, "First-delivery log full, evicted oldest entry");
        }
        self.seen.insert(id.clone(), now);
        self.order.push_back((now, id));
        true
    }

    pub fn get(&self, id: &MessageId) -> Option<Instant> {
        self.seen.get(id).copied()
    }

    /// Drops entries older than the TTL and returns how many were removed.
    pub fn prune_expired(&mut self, now: Instant) -> usize {
        let mut removed = 0;
        while let Some((first_seen, _)) = self.order.front() {
            if now.saturating_duration_since(*first_seen) <= self.ttl {
                break;
            }
            if let Some((_, id)) = self.order.pop_front() {
                self.seen.remove(&id);
                removed += 1;
            }
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }
}
