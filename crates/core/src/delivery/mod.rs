//! Choke/unchoke delivery tracking.
//!
//! For every remote peer and topic the tracker counts how often the peer delivers a
//! message first versus as a duplicate. Once per heartbeat those counts decide which
//! links get choked (demoted to IHAVE announcements only), and the usefulness of a
//! choked peer's IHAVEs decides when it is unchoked again.
//!
//! [`DeliveryTracker`] is the single-owner core: plain data behind `&mut self`, with
//! the selectors as pure functions over its statistics. [`SharedDeliveryTracker`]
//! puts it behind one lock for use from both the message path and the heartbeat.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::config::{ChokeConfig, ConfigError};
use crate::util::time_source::{InstantTimeSrc, TimeSource};

mod first_seen;
mod latency;
mod select;
mod shared;
mod stats;

use self::first_seen::FirstSeenLog;
pub use self::latency::RunningMean;
pub use self::shared::SharedDeliveryTracker;
pub use self::stats::{PairStats, StatsStore};

/// Bounds for anything used as a peer identity.
///
/// `Ord` is needed so that candidates with equal rank are chosen deterministically.
pub trait PeerKey: Clone + Eq + Hash + Ord + fmt::Debug {}

impl<T: Clone + Eq + Hash + Ord + fmt::Debug> PeerKey for T {}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TopicId(Arc<str>);

impl TopicId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TopicId {
    fn from(topic: &str) -> Self {
        TopicId(Arc::from(topic))
    }
}

impl From<String> for TopicId {
    fn from(topic: String) -> Self {
        TopicId(Arc::from(topic))
    }
}

impl fmt::Display for TopicId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque message identity as computed by the surrounding protocol.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MessageId(Bytes);

impl MessageId {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<Bytes> for MessageId {
    fn from(id: Bytes) -> Self {
        MessageId(id)
    }
}

impl From<Vec<u8>> for MessageId {
    fn from(id: Vec<u8>) -> Self {
        MessageId(Bytes::from(id))
    }
}

impl From<&str> for MessageId {
    fn from(id: &str) -> Self {
        MessageId(Bytes::copy_from_slice(id.as_bytes()))
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&bs58::encode(&self.0).into_string())
    }
}

/// Choke or unchoke decisions, keyed by peer.
pub type TopicsByPeer<P> = BTreeMap<P, BTreeSet<TopicId>>;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DeliveryError {
    /// A duplicate arrived for a message whose first delivery was never recorded
    /// (or has already left the first-delivery log).
    #[error("duplicate of unknown message {0}")]
    UnknownMessage(MessageId),
    #[error("first delivery of message {0} already recorded")]
    AlreadyDelivered(MessageId),
}

/// Decisions taken during one heartbeat, already applied to the tracker.
///
/// The protocol layer turns these into CHOKE/UNCHOKE control messages.
#[derive(Debug, PartialEq, Eq)]
pub struct HeartbeatOutcome<P> {
    pub choked: TopicsByPeer<P>,
    pub unchoked: TopicsByPeer<P>,
}

impl<P> Default for HeartbeatOutcome<P> {
    fn default() -> Self {
        Self {
            choked: BTreeMap::new(),
            unchoked: BTreeMap::new(),
        }
    }
}

impl<P> HeartbeatOutcome<P> {
    pub fn is_empty(&self) -> bool {
        self.choked.is_empty() && self.unchoked.is_empty()
    }
}

pub struct DeliveryTracker<P, T = InstantTimeSrc> {
    config: ChokeConfig,
    stats: StatsStore<P>,
    first_seen: FirstSeenLog,
    time_source: T,
}

impl<P: PeerKey> DeliveryTracker<P, InstantTimeSrc> {
    pub fn new(config: ChokeConfig) -> Result<Self, ConfigError> {
        Self::with_time_source(config, InstantTimeSrc::new())
    }
}

impl<P: PeerKey, T: TimeSource> DeliveryTracker<P, T> {
    /// Builds a tracker after validating `config`.
    pub fn with_time_source(config: ChokeConfig, time_source: T) -> Result<Self, ConfigError> {
        config.validate()?;
        tracing::info!(
            choke_threshold = config.choke_duplicates_threshold,
            choke_churn = config.choke_churn,
            unchoke_threshold = config.unchoke_threshold,
            unchoke_churn = config.unchoke_churn,
            "Creating delivery tracker"
        );
        Ok(Self {
            first_seen: FirstSeenLog::new(config.first_seen_ttl, config.first_seen_capacity),
            config,
            stats: StatsStore::default(),
            time_source,
        })
    }

    pub fn config(&self) -> &ChokeConfig {
        &self.config
    }

    pub fn stats(&self) -> &StatsStore<P> {
        &self.stats
    }

    /// Statistics for one pair; all zero if the pair was never observed.
    pub fn pair_stats(&self, peer: &P, topic: &TopicId) -> PairStats {
        self.stats.get(peer, topic).copied().unwrap_or_default()
    }

    pub fn record_first_delivery(
        &mut self,
        peer: &P,
        topic: &TopicId,
        message_id: MessageId,
    ) -> Result<(), DeliveryError> {
        let now = self.time_source.now();
        if !self.first_seen.insert(message_id.clone(), now) {
            return Err(DeliveryError::AlreadyDelivered(message_id));
        }
        self.stats.entry(peer, topic).first_deliveries += 1;
        Ok(())
    }

    /// Counts a duplicate from `peer` and folds its latency into the pair's mean.
    ///
    /// The latency is the time since `message_id` was first delivered by anyone.
    /// Nothing is recorded if that first delivery is unknown.
    pub fn record_duplicate(
        &mut self,
        peer: &P,
        topic: &TopicId,
        message_id: &MessageId,
    ) -> Result<Duration, DeliveryError> {
        let Some(first_seen) = self.first_seen.get(message_id) else {
            return Err(DeliveryError::UnknownMessage(message_id.clone()));
        };
        let latency = self.time_source.now().saturating_duration_since(first_seen);
        self.stats.entry(peer, topic).duplicate_latency.insert(latency);
        Ok(latency)
    }

    pub fn record_first_ihave(&mut self, peer: &P, topic: &TopicId) {
        self.stats.entry(peer, topic).first_ihaves += 1;
    }

    pub fn record_duplicate_ihave(&mut self, peer: &P, topic: &TopicId) {
        self.stats.entry(peer, topic).duplicate_ihaves += 1;
    }

    pub fn on_message_delivered(
        &mut self,
        peer: &P,
        topic: &TopicId,
        message_id: MessageId,
        is_first: bool,
    ) -> Result<(), DeliveryError> {
        if is_first {
            self.record_first_delivery(peer, topic, message_id)
        } else {
            self.record_duplicate(peer, topic, &message_id).map(|_| ())
        }
    }

    pub fn on_ihave_outcome(&mut self, peer: &P, topic: &TopicId, was_first: bool) {
        if was_first {
            self.record_first_ihave(peer, topic);
        } else {
            self.record_duplicate_ihave(peer, topic);
        }
    }

    pub fn on_remote_choke_signal(&mut self, peer: &P, topic: &TopicId, choked: bool) {
        if choked {
            self.record_remote_choke(peer, topic);
        } else {
            self.record_remote_unchoke(peer, topic);
        }
    }

    pub fn select_chokes(&self) -> TopicsByPeer<P> {
        select::select_chokes(
            &self.stats,
            self.config.choke_duplicates_threshold,
            self.config.choke_churn,
        )
    }

    pub fn select_unchokes(&self) -> TopicsByPeer<P> {
        select::select_unchokes(
            &self.stats,
            self.config.unchoke_threshold,
            self.config.unchoke_churn,
        )
    }

    /// Marks every pair in `chokes` as locally choked. Already choked pairs stay choked.
    pub fn apply_chokes(&mut self, chokes: &TopicsByPeer<P>) {
        for (peer, topics) in chokes {
            for topic in topics {
                let stats = self.stats.entry(peer, topic);
                if !stats.locally_choked {
                    stats.locally_choked = true;
                    tracing::debug!(peer = ?peer, topic = %topic, "Choked peer");
                }
            }
        }
    }

    /// Lifts the local choke on every pair in `unchokes` and clears its IHAVE counters.
    pub fn apply_unchokes(&mut self, unchokes: &TopicsByPeer<P>) {
        for (peer, topics) in unchokes {
            for topic in topics {
                let Some(stats) = self.stats.get_mut(peer, topic) else {
                    continue;
                };
                stats.locally_choked = false;
                stats.first_ihaves = 0;
                stats.duplicate_ihaves = 0;
                tracing::debug!(peer = ?peer, topic = %topic, "Unchoked peer");
            }
        }
    }

    pub fn record_remote_choke(&mut self, peer: &P, topic: &TopicId) {
        self.stats.entry(peer, topic).remotely_choked = true;
        tracing::debug!(peer = ?peer, topic = %topic, "Choked by remote peer");
    }

    pub fn record_remote_unchoke(&mut self, peer: &P, topic: &TopicId) {
        if let Some(stats) = self.stats.get_mut(peer, topic) {
            stats.remotely_choked = false;
            tracing::debug!(peer = ?peer, topic = %topic, "Unchoked by remote peer");
        }
    }

    pub fn is_choked_locally(&self, peer: &P, topic: &TopicId) -> bool {
        self.stats
            .get(peer, topic)
            .is_some_and(|stats| stats.locally_choked)
    }

    pub fn is_choked_by_remote(&self, peer: &P, topic: &TopicId) -> bool {
        self.stats
            .get(peer, topic)
            .is_some_and(|stats| stats.remotely_choked)
    }

    /// Topics on which we currently choke `peer`.
    pub fn locally_choked_topics(&self, peer: &P) -> impl Iterator<Item = &TopicId> + '_ {
        self.stats
            .topics_of(peer)
            .filter(|(_, stats)| stats.locally_choked)
            .map(|(topic, _)| topic)
    }

    /// Drops everything known about a disconnected peer.
    pub fn forget_peer(&mut self, peer: &P) {
        if self.stats.remove_peer(peer) {
            tracing::debug!(peer = ?peer, "Dropped delivery statistics for peer");
        }
    }

    /// Removes first-delivery timestamps past their TTL.
    pub fn prune_first_seen(&mut self) -> usize {
        let removed = self.first_seen.prune_expired(self.time_source.now());
        if removed > 0 {
            tracing::trace!(removed, remaining = self.first_seen.len(), "Pruned first-delivery log");
        }
        removed
    }

    pub fn first_seen_len(&self) -> usize {
        self.first_seen.len()
    }

    /// Runs one decision cycle and applies its result.
    ///
    /// Both selectors see the same statistics. The choke selector only looks at
    /// unchoked pairs and the unchoke selector only at choked ones, so no pair can
    /// flip twice within a cycle.
    pub fn heartbeat(&mut self) -> HeartbeatOutcome<P> {
        self.prune_first_seen();

        let choked = self.select_chokes();
        let unchoked = self.select_unchokes();
        self.apply_chokes(&choked);
        self.apply_unchokes(&unchoked);

        if !choked.is_empty() || !unchoked.is_empty() {
            tracing::debug!(
                choked_peers = choked.len(),
                unchoked_peers = unchoked.len(),
                "Heartbeat changed choke state"
            );
        }
        HeartbeatOutcome { choked, unchoked }
    }
}

impl<P, T> fmt::Debug for DeliveryTracker<P, T>
where
    P: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeliveryTracker")
            .field("config", &self.config)
            .field("stats", &self.stats)
            .field("first_seen", &self.first_seen)
            .finish_non_exhaustive()
    }
}
