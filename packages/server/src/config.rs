//! Runtime configuration of the real-time core.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// What to do when a connection's outbound queue is full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum BackpressurePolicy {
    /// Discard the oldest queued message to make room for the new one
    #[default]
    DropOldest,
    /// Close the slow connection
    Disconnect,
}

/// Knobs for the registry, directory, and history store.
///
/// `Default` gives the values documented for the server binary flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// Maximum number of concurrently admitted connections
    pub max_connections: usize,
    /// Reject a second connection for a user that already holds one
    pub single_session: bool,
    /// Per-connection outbound queue length
    pub outbound_capacity: usize,
    pub backpressure: BackpressurePolicy,
    /// Messages kept per room; `None` keeps everything
    pub history_retention: Option<usize>,
    /// Connections silent for longer than this are removed
    pub idle_timeout: Duration,
    /// How long an empty implicit room survives before eviction
    pub room_grace_period: Duration,
    /// How often the idle sweeper runs
    pub sweep_interval: Duration,
    /// Create rooms on first join/publish instead of requiring `create_room`
    pub implicit_rooms: bool,
    /// Publish presence transitions into rooms as `presence` messages.
    /// When off, presence is still tracked and queryable.
    pub presence_events: bool,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            max_connections: 1024,
            single_session: false,
            outbound_capacity: 256,
            backpressure: BackpressurePolicy::DropOldest,
            history_retention: Some(1000),
            idle_timeout: Duration::from_secs(300),
            room_grace_period: Duration::from_secs(60),
            sweep_interval: Duration::from_secs(15),
            implicit_rooms: true,
            presence_events: true,
        }
    }
}
