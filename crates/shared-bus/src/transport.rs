//! # Peer Transport Contract
//!
//! The pub/sub primitives the gossip layer is built on. Peer discovery, NAT
//! traversal and relaying are the transport's business; the gossip layer only
//! sees topic membership events and opaque packets.

use async_trait::async_trait;
use shared_types::PeerId;
use std::fmt;
use thiserror::Error;
use tokio::sync::mpsc;

/// A pub/sub group identifier (the subcluster key of a channel).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Topic(pub [u8; 32]);

impl Topic {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0[..6] {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

/// Events delivered to a topic subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A peer became reachable on this topic.
    PeerJoined(PeerId),
    /// A peer is no longer reachable on this topic.
    PeerLeft(PeerId),
    /// Raw bytes from `from` (the originating peer).
    Packet { from: PeerId, bytes: Vec<u8> },
}

/// Transport failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("not subscribed to topic {0}")]
    NotSubscribed(Topic),

    #[error("peer {0} is not reachable")]
    PeerUnreachable(PeerId),

    #[error("transport closed")]
    Closed,
}

/// Publish/subscribe plus direct-peer messaging.
///
/// `publish` is an untargeted broadcast that the transport may relay for up
/// to `ttl` hops. `stream` goes only to the peers currently connected on the
/// topic. Both return how many peers the bytes were handed to; delivery is
/// best-effort.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    fn local_peer(&self) -> PeerId;

    async fn subscribe(
        &self,
        topic: Topic,
    ) -> Result<mpsc::Receiver<TransportEvent>, TransportError>;

    async fn unsubscribe(&self, topic: Topic);

    fn connected_peers(&self, topic: Topic) -> Vec<PeerId>;

    async fn publish(&self, topic: Topic, bytes: Vec<u8>, ttl: u8)
        -> Result<usize, TransportError>;

    async fn stream(&self, topic: Topic, bytes: Vec<u8>, ttl: u8)
        -> Result<usize, TransportError>;

    async fn send_to(
        &self,
        topic: Topic,
        peer: PeerId,
        bytes: Vec<u8>,
    ) -> Result<(), TransportError>;
}
