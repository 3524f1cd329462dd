//! Ports for the gossip channel subsystem.

pub mod inbound;
pub mod outbound;

pub use inbound::GossipApi;
pub use outbound::{GossipHandler, PeerTransport};
