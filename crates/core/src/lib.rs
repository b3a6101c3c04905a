/// Tracker configuration: thresholds, churn limits and retention.
pub mod config;

/// Per-peer, per-topic delivery statistics and choke/unchoke decisions.
pub mod delivery;

/// Timer task running the choke/unchoke decision cycle.
pub mod heartbeat;

/// Logging infrastructure.
pub mod tracing;

pub mod util;

pub use config::{ChokeArgs, ChokeConfig, ConfigError};
pub use delivery::{
    DeliveryError, DeliveryTracker, HeartbeatOutcome, MessageId, PairStats, PeerKey,
    SharedDeliveryTracker, TopicId, TopicsByPeer,
};
pub use heartbeat::spawn_heartbeat;
