//! Outbound ports: gossip underneath, input observers on the side.

use shared_types::{ChannelId, PeerId, Round};

pub use rc_03_gossip_channel::GossipApi;

/// Notified synchronously whenever a new `Input` is stored, whether it was
/// committed locally or received. Implementations must not block.
pub trait InputObserver: Send + Sync {
    fn on_input(&self, channel: &ChannelId, round: Round, peer: &PeerId);
}
