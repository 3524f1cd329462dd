//! Gossip error types.

use rc_01_wire_codec::CodecError;
use shared_bus::TransportError;
use shared_types::{CanonicalError, ChannelId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GossipError {
    #[error("Channel {0} is not joined")]
    NotJoined(ChannelId),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Signing error: {0}")]
    Signing(#[from] CanonicalError),

    #[error("Gossip service is shut down")]
    Shutdown,
}
