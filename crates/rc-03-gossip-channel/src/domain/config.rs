//! Gossip configuration.

use serde::Deserialize;
use std::time::Duration;

/// Timing and buffering knobs for a gossip service.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct GossipConfig {
    /// Period of the peer-delta and keep-alive loop.
    pub status_interval_ms: u64,
    /// Pending joins that force an early flush.
    pub join_batch_capacity: usize,
    /// Pending packets that force an early flush.
    pub packet_buffer_capacity: usize,
    /// Period at which buffered joins and packets are handed on.
    pub flush_interval_ms: u64,
    /// How long a direct request waits before resolving empty.
    pub rpc_timeout_ms: u64,
    /// Hop limit for broadcasts.
    pub default_ttl: u8,
    /// Name advertised in keep-alives.
    pub display_name: Option<String>,
}

impl Default for GossipConfig {
    fn default() -> Self {
        Self {
            status_interval_ms: 1000,
            join_batch_capacity: 100,
            packet_buffer_capacity: 1024,
            flush_interval_ms: 50,
            rpc_timeout_ms: 1000,
            default_ttl: 3,
            display_name: None,
        }
    }
}

impl GossipConfig {
    pub fn status_interval(&self) -> Duration {
        Duration::from_millis(self.status_interval_ms.max(1))
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms.max(1))
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = GossipConfig::default();
        assert_eq!(config.status_interval(), Duration::from_secs(1));
        assert_eq!(config.join_batch_capacity, 100);
        assert_eq!(config.packet_buffer_capacity, 1024);
        assert_eq!(config.flush_interval(), Duration::from_millis(50));
        assert_eq!(config.rpc_timeout(), Duration::from_secs(1));
        assert_eq!(config.default_ttl, 3);
    }

    #[test]
    fn test_zero_intervals_are_clamped() {
        let config = GossipConfig {
            status_interval_ms: 0,
            flush_interval_ms: 0,
            ..Default::default()
        };
        assert_eq!(config.status_interval(), Duration::from_millis(1));
        assert_eq!(config.flush_interval(), Duration::from_millis(1));
    }
}
