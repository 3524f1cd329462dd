//! Message log configuration.

use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Entries in each signature dedup cache.
    pub dedup_capacity: usize,
    /// Lifetime of a dedup entry.
    pub dedup_ttl_secs: u64,
    /// Hop limit passed with every broadcast.
    pub broadcast_ttl: u8,
    /// Period of the head re-broadcast loop.
    pub head_rebroadcast_ms: u64,
    /// Most recent messages per peer considered for acknowledgement.
    pub ackable_per_peer: usize,
    /// Upper bound on messages returned for one height-range request.
    pub max_response_messages: u64,
    /// Buffered events per subscriber before the slowest one lags.
    pub event_capacity: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            dedup_capacity: 500,
            dedup_ttl_secs: 300,
            broadcast_ttl: 3,
            head_rebroadcast_ms: 2000,
            ackable_per_peer: 2,
            max_response_messages: 256,
            event_capacity: 256,
        }
    }
}

impl LogConfig {
    pub fn dedup_ttl(&self) -> Duration {
        Duration::from_secs(self.dedup_ttl_secs)
    }

    pub fn head_rebroadcast_interval(&self) -> Duration {
        Duration::from_millis(self.head_rebroadcast_ms.max(1))
    }
}
