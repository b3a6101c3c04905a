//! Per-(peer, topic) delivery statistics.
//!
//! Stored as a two-level map, peer first, so that queries borrow their keys and
//! dropping a disconnected peer is a single removal. Every mutation goes through
//! [`StatsStore::entry`], which creates both levels on demand.

use std::collections::HashMap;
use std::time::Duration;

use super::latency::RunningMean;
use super::{PeerKey, TopicId};

/// Everything the tracker knows about one peer on one topic.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PairStats {
    /// Latency of duplicate deliveries; its sample count is the duplicate counter.
    pub(crate) duplicate_latency: RunningMean,
    pub(crate) first_deliveries: u64,
    pub(crate) first_ihaves: u64,
    pub(crate) duplicate_ihaves: u64,
    pub(crate) locally_choked: bool,
    pub(crate) remotely_choked: bool,
}

impl PairStats {
    pub fn duplicates(&self) -> u64 {
        self.duplicate_latency.samples()
    }

    pub fn duplicate_latency(&self) -> Duration {
        self.duplicate_latency.get()
    }

    pub fn first_deliveries(&self) -> u64 {
        self.first_deliveries
    }

    pub fn first_ihaves(&self) -> u64 {
        self.first_ihaves
    }

    pub fn duplicate_ihaves(&self) -> u64 {
        self.duplicate_ihaves
    }

    pub fn is_choked_locally(&self) -> bool {
        self.locally_choked
    }

    pub fn is_choked_by_remote(&self) -> bool {
        self.remotely_choked
    }

    /// Share of deliveries from this peer that were duplicates.
    ///
    /// `None` when nothing was delivered; an undefined ratio must never pass a threshold.
    pub fn duplicate_ratio(&self) -> Option<f64> {
        ratio(self.duplicates(), self.first_deliveries)
    }

    /// Share of IHAVE announcements from this peer that were first to name a message.
    pub fn ihave_ratio(&self) -> Option<f64> {
        ratio(self.first_ihaves, self.duplicate_ihaves)
    }
}

fn ratio(part: u64, rest: u64) -> Option<f64> {
    let total = part.checked_add(rest)?;
    if total == 0 {
        return None;
    }
    Some(part as f64 / total as f64)
}

#[derive(Debug)]
pub struct StatsStore<P> {
    peers: HashMap<P, HashMap<TopicId, PairStats>>,
}

impl<P> Default for StatsStore<P> {
    fn default() -> Self {
        Self {
            peers: HashMap::new(),
        }
    }
}

impl<P: PeerKey> StatsStore<P> {
    pub fn get(&self, peer: &P, topic: &TopicId) -> Option<&PairStats> {
        self.peers.get(peer).and_then(|topics| topics.get(topic))
    }

    /// Mutable access to a pair, creating the peer and topic levels as needed.
    pub(crate) fn entry(&mut self, peer: &P, topic: &TopicId) -> &mut PairStats {
        self.peers
            .entry(peer.clone())
            .or_default()
            .entry(topic.clone())
            .or_default()
    }

    /// Mutable access to a pair that already exists.
    pub(crate) fn get_mut(&mut self, peer: &P, topic: &TopicId) -> Option<&mut PairStats> {
        self.peers
            .get_mut(peer)
            .and_then(|topics| topics.get_mut(topic))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&P, &TopicId, &PairStats)> {
        self.peers
            .iter()
            .flat_map(|(peer, topics)| topics.iter().map(move |(topic, s)| (peer, topic, s)))
    }

    pub fn topics_of<'a>(&'a self, peer: &P) -> impl Iterator<Item = (&'a TopicId, &'a PairStats)> {
        self.peers.get(peer).into_iter().flat_map(|topics| topics.iter())
    }

    pub(crate) fn remove_peer(&mut self, peer: &P) -> bool {
        self.peers.remove(peer).is_some()
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}
