//! Timer driving the choke/unchoke decision cycle.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::delivery::{HeartbeatOutcome, PeerKey, SharedDeliveryTracker};
use crate::util::time_source::TimeSource;

/// Runs [`SharedDeliveryTracker::heartbeat`] every configured interval and forwards
/// every outcome that changed something to `outcomes`.
///
/// The task ends once the receiving side of `outcomes` is dropped.
pub fn spawn_heartbeat<P, T>(
    tracker: SharedDeliveryTracker<P, T>,
    outcomes: mpsc::Sender<HeartbeatOutcome<P>>,
) -> JoinHandle<()>
where
    P: PeerKey + Send + 'static,
    T: TimeSource + Send + 'static,
{
    let period = tracker.heartbeat_interval();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately; nothing has been observed yet.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = outcomes.closed() => break,
            }
            let outcome = tracker.heartbeat();
            if outcome.is_empty() {
                continue;
            }
            if outcomes.send(outcome).await.is_err() {
                break;
            }
        }
        tracing::debug!("Choke heartbeat stopped, outcome receiver dropped");
    })
}
