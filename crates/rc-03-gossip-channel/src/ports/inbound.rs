//! Inbound port: what the gossip layer offers to the message log.

use crate::domain::GossipError;
use async_trait::async_trait;
use shared_types::{ChannelId, Message, PeerId, RpcRequest, RpcResponse};

/// Channel membership, broadcast and direct requests.
#[async_trait]
pub trait GossipApi: Send + Sync {
    fn local_peer(&self) -> PeerId;

    /// Subscribe to the channel's subcluster. Joining twice is a no-op.
    async fn join(&self, channel: ChannelId) -> Result<(), GossipError>;

    async fn leave(&self, channel: &ChannelId);

    /// Broadcast `messages` as one batch. Returns the number of peers the
    /// batch was handed to.
    async fn emit(
        &self,
        channel: &ChannelId,
        messages: Vec<Message>,
        ttl: u8,
    ) -> Result<usize, GossipError>;

    /// Ask one peer directly. Resolves to an empty response on timeout or
    /// send failure.
    async fn request(&self, channel: &ChannelId, peer: PeerId, request: RpcRequest)
        -> RpcResponse;

    fn connected_peers(&self, channel: &ChannelId) -> Vec<PeerId>;

    fn joined_channels(&self) -> Vec<ChannelId>;

    /// Stop every loop, leave every channel and forget all peers.
    async fn shutdown(&self);
}
