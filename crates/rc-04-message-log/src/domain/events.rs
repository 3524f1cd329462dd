//! Events published by the message log.

use shared_types::{Channel, ChannelId, Chat, PeerId, PeerRecord, Round, Signature};

/// Notifications for observers of the log (UI, session driver, tests).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogEvent {
    /// A `CreateChannel` or `SetPeers` changed a channel record.
    ChannelUpdated(Channel),
    /// A peer record changed (liveness or heights).
    PeersChanged(PeerRecord),
    /// A chat line arrived on a joined channel.
    Chat {
        channel: ChannelId,
        from: PeerId,
        chat: Chat,
    },
    /// A new `Input` was stored, local or remote.
    InputStored {
        channel: ChannelId,
        round: Round,
        peer: PeerId,
        sig: Signature,
    },
}
