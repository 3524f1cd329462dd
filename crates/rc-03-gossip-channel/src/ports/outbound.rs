//! Outbound ports: the transport underneath and the handler above.

use async_trait::async_trait;
use shared_types::{ChannelId, Message, PeerId, PeerRecord, RpcRequest, RpcResponse};

pub use shared_bus::PeerTransport;

/// Receives everything the gossip layer does not consume itself.
///
/// Keep-alives are handled inside the gossip layer and surface only as
/// `on_peer_update` calls.
#[async_trait]
pub trait GossipHandler: Send + Sync {
    /// A chain message or chat line, in receipt order.
    async fn on_message(&self, channel: ChannelId, from: PeerId, message: Message);

    /// A peer's liveness record changed.
    async fn on_peer_update(&self, channel: ChannelId, record: PeerRecord);

    /// Peers that became directly reachable since the last flush.
    async fn on_peers_joined(&self, channel: ChannelId, peers: Vec<PeerId>);

    async fn on_request(&self, channel: ChannelId, from: PeerId, request: RpcRequest)
        -> RpcResponse;
}
