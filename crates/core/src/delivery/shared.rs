use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::{
    DeliveryError, DeliveryTracker, HeartbeatOutcome, MessageId, PairStats, PeerKey, TopicId,
    TopicsByPeer,
};
use crate::config::{ChokeConfig, ConfigError};
use crate::util::time_source::{InstantTimeSrc, TimeSource};

/// Cloneable handle to a [`DeliveryTracker`] shared between the message path and
/// the heartbeat.
///
/// Every call takes the same exclusive lock, so a selector never sees half of an
/// update and an `apply_*` is visible either entirely or not at all.
pub struct SharedDeliveryTracker<P, T = InstantTimeSrc> {
    inner: Arc<Mutex<DeliveryTracker<P, T>>>,
}

impl<P, T> Clone for SharedDeliveryTracker<P, T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<P: PeerKey> SharedDeliveryTracker<P, InstantTimeSrc> {
    pub fn new(config: ChokeConfig) -> Result<Self, ConfigError> {
        Ok(Self::from(DeliveryTracker::new(config)?))
    }
}

impl<P, T> From<DeliveryTracker<P, T>> for SharedDeliveryTracker<P, T> {
    fn from(tracker: DeliveryTracker<P, T>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(tracker)),
        }
    }
}

impl<P: PeerKey, T: TimeSource> SharedDeliveryTracker<P, T> {
    pub fn heartbeat_interval(&self) -> Duration {
        self.inner.lock().config().heartbeat_interval
    }

    pub fn pair_stats(&self, peer: &P, topic: &TopicId) -> PairStats {
        self.inner.lock().pair_stats(peer, topic)
    }

    pub fn on_message_delivered(
        &self,
        peer: &P,
        topic: &TopicId,
        message_id: MessageId,
        is_first: bool,
    ) -> Result<(), DeliveryError> {
        self.inner
            .lock()
            .on_message_delivered(peer, topic, message_id, is_first)
    }

    pub fn on_ihave_outcome(&self, peer: &P, topic: &TopicId, was_first: bool) {
        self.inner.lock().on_ihave_outcome(peer, topic, was_first);
    }

    pub fn on_remote_choke_signal(&self, peer: &P, topic: &TopicId, choked: bool) {
        self.inner
            .lock()
            .on_remote_choke_signal(peer, topic, choked);
    }

    pub fn select_chokes(&self) -> TopicsByPeer<P> {
        self.inner.lock().select_chokes()
    }

    pub fn select_unchokes(&self) -> TopicsByPeer<P> {
        self.inner.lock().select_unchokes()
    }

    pub fn apply_chokes(&self, chokes: &TopicsByPeer<P>) {
        self.inner.lock().apply_chokes(chokes);
    }

    pub fn apply_unchokes(&self, unchokes: &TopicsByPeer<P>) {
        self.inner.lock().apply_unchokes(unchokes);
    }

    pub fn is_choked_locally(&self, peer: &P, topic: &TopicId) -> bool {
        self.inner.lock().is_choked_locally(peer, topic)
    }

    pub fn is_choked_by_remote(&self, peer: &P, topic: &TopicId) -> bool {
        self.inner.lock().is_choked_by_remote(peer, topic)
    }

    pub fn locally_choked_topics(&self, peer: &P) -> Vec<TopicId> {
        self.inner
            .lock()
            .locally_choked_topics(peer)
            .cloned()
            .collect()
    }

    pub fn forget_peer(&self, peer: &P) {
        self.inner.lock().forget_peer(peer);
    }

    pub fn heartbeat(&self) -> HeartbeatOutcome<P> {
        self.inner.lock().heartbeat()
    }
}
