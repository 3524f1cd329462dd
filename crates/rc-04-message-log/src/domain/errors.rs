//! Message log error types.

use rc_02_message_store::StoreError;
use rc_03_gossip_channel::GossipError;
use shared_types::{CanonicalError, ChannelId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LogError {
    /// Another commit is in flight on this log.
    #[error("A commit is already in progress")]
    Busy,

    #[error("Unknown channel: {0}")]
    UnknownChannel(ChannelId),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Signing error: {0}")]
    Signing(#[from] CanonicalError),

    #[error("Gossip error: {0}")]
    Gossip(#[from] GossipError),
}
