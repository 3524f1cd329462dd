//! # Wire Codec (rc-01)
//!
//! Encodes typed messages to a compact binary format and back. Pure and
//! stateless.
//!
//! ## Format
//!
//! Every message is `[tag: u8][fields]`, where `fields` is the bincode
//! encoding of a fixed, per-type field tuple:
//!
//! | Tag | Type | Fields |
//! |-----|------|--------|
//! | 1 | CreateChannel | name, peer, parent, height, acks, sig |
//! | 2 | Input | round, channel, data, peer, parent, height, acks, sig |
//! | 3 | SetPeers | channel, peers, peer, parent, height, acks, sig |
//! | 4 | KeepAlive | timestamp, sees, name, peer, sig |
//! | 5 | Chat | id, text |
//!
//! Gossip frames wrap messages: `0x10` batch, `0x11` request, `0x12` response.
//! Decoding dispatches strictly on the leading tag; unknown tags are errors.

pub mod errors;
pub mod message;
pub mod packet;

pub use errors::CodecError;
pub use message::{decode_message, encode_message};
pub use packet::{decode_packet, encode_packet, Packet};

/// Upper bound on a single decoded frame. Length prefixes beyond this are
/// treated as malformed instead of being allocated.
pub const MAX_FRAME_BYTES: u64 = 1 << 20;

pub(crate) fn bincode_options() -> impl bincode::Options + Copy {
    use bincode::Options;
    bincode::DefaultOptions::new()
        .with_limit(MAX_FRAME_BYTES)
        .reject_trailing_bytes()
}
