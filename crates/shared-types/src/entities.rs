//! # Core Domain Entities
//!
//! ## Clusters
//!
//! - **Identity**: [`PeerId`], [`Signature`], [`ChannelId`]
//! - **Messages**: [`ChainBody`], [`UnsignedChainMessage`], [`ChainMessage`],
//!   [`KeepAlive`], [`Chat`], [`Message`], [`StoredMessage`]
//! - **Membership**: [`Channel`], [`PeerRecord`]
//! - **Simulation**: [`PlayerInput`], [`GameSnapshot`], [`SerializedState`]
//! - **Peer RPC**: [`RpcRequest`], [`RpcResponse`]

use std::fmt;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, Bytes};

use crate::errors::TypeError;

/// A simulation round: wall-clock time divided by the tick rate.
pub type Round = u64;

/// One player's input for one round. Zero is the neutral input.
pub type InputBits = u32;

// =============================================================================
// CLUSTER A: IDENTITY
// =============================================================================

/// Durable peer identifier: the peer's Ed25519 public key.
///
/// Ordering is byte-lexicographic, which fixes the order in which per-peer
/// inputs are fed to the game step.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct PeerId(pub [u8; 32]);

impl PeerId {
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from a 64-character hex string.
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        let arr: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| TypeError::InvalidLength {
                expected: 32,
                actual: bytes.len(),
            })?;
        Ok(Self(arr))
    }

    /// First eight hex characters, for log lines.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerId({})", self.short())
    }
}

/// Detached Ed25519 signature; the sole global identifier of a chain message.
#[serde_as]
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Signature(#[serde_as(as = "Bytes")] pub [u8; 64]);

impl Signature {
    pub fn new(bytes: [u8; 64]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0)
    }

    pub fn from_base64(s: &str) -> Result<Self, TypeError> {
        let bytes = STANDARD
            .decode(s)
            .map_err(|e| TypeError::InvalidBase64(e.to_string()))?;
        let arr: [u8; 64] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| TypeError::InvalidLength {
                expected: 64,
                actual: bytes.len(),
            })?;
        Ok(Self(arr))
    }

    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Sig({})", self.short())
    }
}

/// Channel identifier: the signature of the channel's genesis
/// `CreateChannel` message. Displayed as base64.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChannelId(pub Signature);

impl ChannelId {
    pub fn from_genesis(sig: Signature) -> Self {
        Self(sig)
    }

    pub fn signature(&self) -> &Signature {
        &self.0
    }

    pub fn from_base64(s: &str) -> Result<Self, TypeError> {
        Signature::from_base64(s).map(Self)
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.to_base64())
    }
}

impl fmt::Debug for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Channel({})", self.0.short())
    }
}

// =============================================================================
// CLUSTER B: MESSAGES
// =============================================================================

/// Payload of a chain message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChainBody {
    /// Genesis of a channel. Its signature becomes the channel id.
    CreateChannel { name: String },
    /// One player's input for one round of a channel's simulation.
    Input {
        round: Round,
        channel: ChannelId,
        data: InputBits,
    },
    /// Replaces the channel's accepted peer set.
    SetPeers {
        channel: ChannelId,
        peers: Vec<PeerId>,
    },
}

impl ChainBody {
    /// Channel this body belongs to. `CreateChannel` has none until signed.
    pub fn channel(&self) -> Option<&ChannelId> {
        match self {
            ChainBody::CreateChannel { .. } => None,
            ChainBody::Input { channel, .. } | ChainBody::SetPeers { channel, .. } => Some(channel),
        }
    }

    /// Round of an `Input`, `None` for everything else.
    pub fn input_round(&self) -> Option<Round> {
        match self {
            ChainBody::Input { round, .. } => Some(*round),
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ChainBody::CreateChannel { .. } => "create_channel",
            ChainBody::Input { .. } => "input",
            ChainBody::SetPeers { .. } => "set_peers",
        }
    }
}

/// A chain message before signing. Its canonical encoding is what gets
/// hashed and signed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsignedChainMessage {
    pub body: ChainBody,
    /// Author's public key.
    pub peer: PeerId,
    /// Signature of the author's previous chain message, `None` at height 0.
    pub parent: Option<Signature>,
    /// 0 for the author's first message, +1 for each subsequent one.
    pub height: u64,
    /// Other peers' messages this one causally follows.
    pub acks: Vec<Signature>,
}

impl UnsignedChainMessage {
    pub fn into_signed(self, sig: Signature) -> ChainMessage {
        ChainMessage {
            body: self.body,
            peer: self.peer,
            parent: self.parent,
            height: self.height,
            acks: self.acks,
            sig,
        }
    }
}

/// A signed entry of one peer's append-only chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainMessage {
    pub body: ChainBody,
    pub peer: PeerId,
    pub parent: Option<Signature>,
    pub height: u64,
    pub acks: Vec<Signature>,
    pub sig: Signature,
}

impl ChainMessage {
    /// The signed region: every field except `sig`.
    pub fn unsigned(&self) -> UnsignedChainMessage {
        UnsignedChainMessage {
            body: self.body.clone(),
            peer: self.peer,
            parent: self.parent,
            height: self.height,
            acks: self.acks.clone(),
        }
    }

    /// Channel the message belongs to. A `CreateChannel` belongs to the
    /// channel it founds.
    pub fn channel(&self) -> ChannelId {
        match self.body.channel() {
            Some(channel) => *channel,
            None => ChannelId::from_genesis(self.sig),
        }
    }

    pub fn input_round(&self) -> Option<Round> {
        self.body.input_round()
    }

    pub fn is_input(&self) -> bool {
        matches!(self.body, ChainBody::Input { .. })
    }
}

/// Unsigned keep-alive; see [`KeepAlive`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsignedKeepAlive {
    pub peer: PeerId,
    pub timestamp: u64,
    pub sees: Vec<PeerId>,
    pub name: Option<String>,
}

impl UnsignedKeepAlive {
    pub fn into_signed(self, sig: Signature) -> KeepAlive {
        KeepAlive {
            peer: self.peer,
            timestamp: self.timestamp,
            sees: self.sees,
            name: self.name,
            sig,
        }
    }
}

/// Liveness beacon carrying the peers the sender currently sees.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeepAlive {
    pub peer: PeerId,
    /// Sender's wall clock in milliseconds.
    pub timestamp: u64,
    pub sees: Vec<PeerId>,
    /// Display name; adopted once per peer.
    pub name: Option<String>,
    pub sig: Signature,
}

impl KeepAlive {
    pub fn unsigned(&self) -> UnsignedKeepAlive {
        UnsignedKeepAlive {
            peer: self.peer,
            timestamp: self.timestamp,
            sees: self.sees.clone(),
            name: self.name.clone(),
        }
    }
}

/// Free-form chat line. Not part of any chain and never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chat {
    pub id: u64,
    pub text: String,
}

/// Everything that travels over a gossip channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    Chain(ChainMessage),
    KeepAlive(KeepAlive),
    Chat(Chat),
}

impl Message {
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Chain(m) => m.body.kind(),
            Message::KeepAlive(_) => "keep_alive",
            Message::Chat(_) => "chat",
        }
    }
}

impl From<ChainMessage> for Message {
    fn from(msg: ChainMessage) -> Self {
        Message::Chain(msg)
    }
}

/// A chain message plus the local sequence number assigned when it was
/// first stored here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub message: ChainMessage,
    /// Local receipt order. Never compared across peers.
    pub arrived: u64,
}

// =============================================================================
// CLUSTER C: MEMBERSHIP
// =============================================================================

/// A channel as resolved from its `CreateChannel` and latest `SetPeers`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub id: ChannelId,
    pub name: String,
    pub creator: PeerId,
    /// Accepted peer set. Empty until a `SetPeers` is accepted.
    pub peers: Vec<PeerId>,
}

impl Channel {
    /// Peer set in deterministic (lexicographic) order.
    pub fn sorted_peers(&self) -> Vec<PeerId> {
        let mut peers = self.peers.clone();
        peers.sort();
        peers.dedup();
        peers
    }
}

/// Everything known locally about a remote peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerRecord {
    pub peer_id: PeerId,
    pub name: Option<String>,
    /// Local wall clock (ms) when the peer was last heard from.
    pub last_seen: u64,
    /// Highest `h` such that heights `0..=h` are all stored locally.
    pub valid_height: Option<u64>,
    /// Highest height observed from this peer.
    pub known_height: Option<u64>,
    pub channels: Vec<ChannelId>,
    pub connected: bool,
    /// Traffic reaches us through a relay rather than a direct link.
    pub proxy: bool,
    /// Peers this peer claims to see, from its latest keep-alive.
    pub sees: Vec<PeerId>,
    /// Timestamp of the newest accepted keep-alive.
    pub last_keep_alive: Option<u64>,
}

impl PeerRecord {
    pub fn new(peer_id: PeerId) -> Self {
        Self {
            peer_id,
            name: None,
            last_seen: 0,
            valid_height: None,
            known_height: None,
            channels: Vec::new(),
            connected: false,
            proxy: false,
            sees: Vec::new(),
            last_keep_alive: None,
        }
    }

    pub fn add_channel(&mut self, channel: ChannelId) {
        if !self.channels.contains(&channel) {
            self.channels.push(channel);
        }
    }
}

// =============================================================================
// CLUSTER D: SIMULATION
// =============================================================================

/// Checkpoint status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StateTag {
    /// Superseded or not yet classified.
    Unknown,
    /// Derived from accepted inputs; eligible as a rollback base.
    Accepted,
    /// Reserved for speculative execution.
    Predicted,
}

/// One peer's slot in a round's input bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerInput {
    pub peer: PeerId,
    pub data: InputBits,
}

/// Opaque game state plus the inputs that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameSnapshot {
    /// Simulated time in milliseconds (`round * rate`).
    pub t: u64,
    /// Game-module-defined serialized state.
    pub data: Vec<u8>,
    pub inputs: Vec<PlayerInput>,
}

/// A checkpoint of a channel's simulation at the end of `round`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedState {
    pub channel: ChannelId,
    pub tag: StateTag,
    pub round: Round,
    /// Store `arrived` counter when the state was derived. Messages with a
    /// larger stamp were not visible to it.
    pub arrived: u64,
    /// Processing ceiling of the pass that derived the state. Inputs further
    /// than the finalization margin below it counted only when confirmed.
    pub ceiling: Round,
    pub state: GameSnapshot,
}

// =============================================================================
// CLUSTER E: PEER RPC
// =============================================================================

/// Direct request to one peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RpcRequest {
    /// Chain messages of `peer` with `from_height <= height <= to_height`.
    MessagesByHeight {
        peer: PeerId,
        from_height: u64,
        to_height: u64,
    },
}

/// Reply to an [`RpcRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RpcResponse {
    Messages(Vec<ChainMessage>),
}

impl RpcResponse {
    /// Neutral result used when a request times out.
    pub fn empty() -> Self {
        RpcResponse::Messages(Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        match self {
            RpcResponse::Messages(msgs) => msgs.is_empty(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_input(round: Round) -> ChainMessage {
        UnsignedChainMessage {
            body: ChainBody::Input {
                round,
                channel: ChannelId::from_genesis(Signature::new([7u8; 64])),
                data: 3,
            },
            peer: PeerId::new([1u8; 32]),
            parent: None,
            height: 0,
            acks: vec![],
        }
        .into_signed(Signature::new([9u8; 64]))
    }

    #[test]
    fn test_peer_id_hex_roundtrip() {
        let peer = PeerId::new([0xAB; 32]);
        let hex = peer.to_hex();
        assert_eq!(hex.len(), 64);
        assert_eq!(PeerId::from_hex(&hex).unwrap(), peer);
        assert!(PeerId::from_hex("abcd").is_err());
    }

    #[test]
    fn test_peer_ordering_is_lexicographic() {
        let mut a = [0u8; 32];
        a[0] = 1;
        let mut b = [0u8; 32];
        b[0] = 2;
        assert!(PeerId::new(a) < PeerId::new(b));
    }

    #[test]
    fn test_channel_id_base64() {
        let channel = ChannelId::from_genesis(Signature::new([5u8; 64]));
        let text = channel.to_string();
        assert_eq!(ChannelId::from_base64(&text).unwrap(), channel);
    }

    #[test]
    fn test_unsigned_roundtrip() {
        let msg = sample_input(12);
        let again = msg.unsigned().into_signed(msg.sig);
        assert_eq!(msg, again);
    }

    #[test]
    fn test_create_channel_belongs_to_itself() {
        let msg = UnsignedChainMessage {
            body: ChainBody::CreateChannel {
                name: "arena".into(),
            },
            peer: PeerId::new([1u8; 32]),
            parent: None,
            height: 0,
            acks: vec![],
        }
        .into_signed(Signature::new([4u8; 64]));
        assert_eq!(msg.channel(), ChannelId::from_genesis(Signature::new([4u8; 64])));
        assert_eq!(msg.input_round(), None);
    }

    #[test]
    fn test_input_round() {
        let msg = sample_input(77);
        assert!(msg.is_input());
        assert_eq!(msg.input_round(), Some(77));
    }

    #[test]
    fn test_sorted_peers_dedups() {
        let channel = Channel {
            id: ChannelId::from_genesis(Signature::new([0u8; 64])),
            name: "c".into(),
            creator: PeerId::new([0u8; 32]),
            peers: vec![
                PeerId::new([3u8; 32]),
                PeerId::new([1u8; 32]),
                PeerId::new([3u8; 32]),
            ],
        };
        assert_eq!(
            channel.sorted_peers(),
            vec![PeerId::new([1u8; 32]), PeerId::new([3u8; 32])]
        );
    }

    #[test]
    fn test_signature_bincode_roundtrip() {
        let sig = Signature::new([0x42; 64]);
        let bytes = bincode::serialize(&sig).unwrap();
        let back: Signature = bincode::deserialize(&bytes).unwrap();
        assert_eq!(sig, back);
    }
}
