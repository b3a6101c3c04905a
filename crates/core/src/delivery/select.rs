//! Choke and unchoke candidate selection.
//!
//! Both selectors are pure functions over a [`StatsStore`] snapshot. Their result
//! is advisory: nothing changes until it is handed to the tracker's `apply_*`.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use super::stats::{PairStats, StatsStore};
use super::{PeerKey, TopicId, TopicsByPeer};

/// Pairs that should newly be choked.
///
/// A pair is a candidate when it is not choked yet and its duplicate ratio is
/// strictly above `threshold`. Per topic, at most `churn` candidates survive,
/// ranked by absolute duplicate count so the biggest sources of waste go first.
pub(crate) fn select_chokes<P: PeerKey>(
    store: &StatsStore<P>,
    threshold: f64,
    churn: usize,
) -> TopicsByPeer<P> {
    let by_topic = group_by_topic(store, |stats| {
        if stats.is_choked_locally() {
            return None;
        }
        let ratio = stats.duplicate_ratio()?;
        (ratio > threshold).then(|| stats.duplicates())
    });
    rank_and_invert(by_topic, churn)
}

/// Choked pairs whose IHAVE announcements have become useful again.
///
/// A pair qualifies when its first-IHAVE ratio is at least `threshold`. Per topic,
/// at most `churn` pairs survive, ranked by first-IHAVE count.
pub(crate) fn select_unchokes<P: PeerKey>(
    store: &StatsStore<P>,
    threshold: f64,
    churn: usize,
) -> TopicsByPeer<P> {
    let by_topic = group_by_topic(store, |stats| {
        if !stats.is_choked_locally() {
            return None;
        }
        let ratio = stats.ihave_ratio()?;
        (ratio >= threshold).then(|| stats.first_ihaves())
    });
    rank_and_invert(by_topic, churn)
}

/// Collects `(peer, rank)` per topic for every pair `rank_of` accepts.
fn group_by_topic<P, F>(store: &StatsStore<P>, rank_of: F) -> HashMap<&TopicId, Vec<(&P, u64)>>
where
    P: PeerKey,
    F: Fn(&PairStats) -> Option<u64>,
{
    let mut by_topic: HashMap<&TopicId, Vec<(&P, u64)>> = HashMap::new();
    for (peer, topic, stats) in store.iter() {
        if let Some(rank) = rank_of(stats) {
            by_topic.entry(topic).or_default().push((peer, rank));
        }
    }
    by_topic
}

fn rank_and_invert<P: PeerKey>(
    by_topic: HashMap<&TopicId, Vec<(&P, u64)>>,
    churn: usize,
) -> TopicsByPeer<P> {
    let mut by_peer: TopicsByPeer<P> = BTreeMap::new();
    for (topic, mut candidates) in by_topic {
        // Highest rank first, ties broken by peer id so the outcome is reproducible.
        candidates.sort_by(|(pa, ra), (pb, rb)| rb.cmp(ra).then_with(|| pa.cmp(pb)));
        candidates.truncate(churn);
        for (peer, _) in candidates {
            by_peer
                .entry(peer.clone())
                .or_insert_with(BTreeSet::new)
                .insert(topic.clone());
        }
    }
    by_peer
}
