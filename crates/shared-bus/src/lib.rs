//! # Shared Bus - Peer Transport
//!
//! The pub/sub transport every gossip channel runs over, plus an in-memory
//! swarm implementation for local sessions and tests.
//!
//! ```text
//! ┌──────────────┐   publish()/stream()   ┌──────────────┐
//! │  Peer A      │ ─────────────────────► │  Peer B      │
//! │  (gossip)    │                        │  (gossip)    │
//! └──────────────┘ ◄───────────────────── └──────────────┘
//!        ▲          TransportEvent stream         ▲
//!        └──────────── topic subscription ────────┘
//! ```
//!
//! Delivery is best-effort: bounded queues drop on overflow and nothing is
//! retransmitted by the transport itself.

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod swarm;
pub mod transport;

pub use swarm::{InMemorySwarm, SwarmNode};
pub use transport::{PeerTransport, Topic, TransportError, TransportEvent};

/// Events buffered per topic subscriber before the swarm starts dropping.
pub const DEFAULT_QUEUE_CAPACITY: usize = 4096;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_capacity() {
        assert_eq!(DEFAULT_QUEUE_CAPACITY, 4096);
    }

    #[test]
    fn test_topic_display_is_short_hex() {
        assert_eq!(Topic([0xab; 32]).to_string(), "abababababab");
    }
}
