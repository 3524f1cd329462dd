//! # Key Layout
//!
//! Every table shares one ordered keyspace, namespaced by a one-byte prefix.
//! Numeric key parts are big-endian so lexicographic order equals numeric
//! order, which is what makes the range scans below work.
//!
//! | Prefix | Key | Value |
//! |--------|-----|-------|
//! | `m` | sig | `StoredMessage` |
//! | `h` | peer, height | sig |
//! | `i` | channel, round, peer | sig (inputs only) |
//! | `a` | arrived | sig |
//! | `k` | acked sig, acker peer, acker sig | empty |
//! | `c` | channel | `Channel` |
//! | `p` | peer | `PeerRecord` |
//! | `s` | channel, round | `SerializedState` |
//! | `x` | name | counter |

use crate::domain::errors::StoreError;
use shared_types::{ChannelId, PeerId, Round, Signature};

/// Key prefixes for the key-value store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum KeyPrefix {
    Message = b'm',
    PeerHeight = b'h',
    Input = b'i',
    Arrived = b'a',
    Ack = b'k',
    Channel = b'c',
    Peer = b'p',
    State = b's',
    Meta = b'x',
}

impl KeyPrefix {
    pub fn byte(self) -> u8 {
        self as u8
    }

    pub fn table(self) -> &'static str {
        match self {
            KeyPrefix::Message => "messages",
            KeyPrefix::PeerHeight => "peer_heights",
            KeyPrefix::Input => "inputs",
            KeyPrefix::Arrived => "arrived",
            KeyPrefix::Ack => "acks",
            KeyPrefix::Channel => "channels",
            KeyPrefix::Peer => "peers",
            KeyPrefix::State => "states",
            KeyPrefix::Meta => "meta",
        }
    }
}

pub const ARRIVED_COUNTER: &[u8] = b"arrived";

/// Builder for compound keys.
pub struct KeyBuf(Vec<u8>);

impl KeyBuf {
    pub fn new(prefix: KeyPrefix) -> Self {
        let mut buf = Vec::with_capacity(1 + 64 + 8 + 64);
        buf.push(prefix.byte());
        Self(buf)
    }

    pub fn peer(mut self, peer: &PeerId) -> Self {
        self.0.extend_from_slice(peer.as_bytes());
        self
    }

    pub fn sig(mut self, sig: &Signature) -> Self {
        self.0.extend_from_slice(sig.as_bytes());
        self
    }

    pub fn channel(self, channel: &ChannelId) -> Self {
        self.sig(channel.signature())
    }

    pub fn u64(mut self, n: u64) -> Self {
        self.0.extend_from_slice(&n.to_be_bytes());
        self
    }

    pub fn bytes(mut self, raw: &[u8]) -> Self {
        self.0.extend_from_slice(raw);
        self
    }

    pub fn build(self) -> Vec<u8> {
        self.0
    }
}

pub fn message_key(sig: &Signature) -> Vec<u8> {
    KeyBuf::new(KeyPrefix::Message).sig(sig).build()
}

pub fn peer_height_key(peer: &PeerId, height: u64) -> Vec<u8> {
    KeyBuf::new(KeyPrefix::PeerHeight).peer(peer).u64(height).build()
}

pub fn peer_height_prefix(peer: &PeerId) -> Vec<u8> {
    KeyBuf::new(KeyPrefix::PeerHeight).peer(peer).build()
}

pub fn input_key(channel: &ChannelId, round: Round, peer: &PeerId) -> Vec<u8> {
    KeyBuf::new(KeyPrefix::Input)
        .channel(channel)
        .u64(round)
        .peer(peer)
        .build()
}

/// First key of `round` in a channel's input table.
pub fn input_round_start(channel: &ChannelId, round: Round) -> Vec<u8> {
    KeyBuf::new(KeyPrefix::Input).channel(channel).u64(round).build()
}

pub fn input_prefix(channel: &ChannelId) -> Vec<u8> {
    KeyBuf::new(KeyPrefix::Input).channel(channel).build()
}

pub fn arrived_key(arrived: u64) -> Vec<u8> {
    KeyBuf::new(KeyPrefix::Arrived).u64(arrived).build()
}

pub fn ack_key(acked: &Signature, acker: &PeerId, acker_sig: &Signature) -> Vec<u8> {
    KeyBuf::new(KeyPrefix::Ack)
        .sig(acked)
        .peer(acker)
        .sig(acker_sig)
        .build()
}

pub fn ack_prefix(acked: &Signature) -> Vec<u8> {
    KeyBuf::new(KeyPrefix::Ack).sig(acked).build()
}

pub fn channel_key(channel: &ChannelId) -> Vec<u8> {
    KeyBuf::new(KeyPrefix::Channel).channel(channel).build()
}

pub fn peer_key(peer: &PeerId) -> Vec<u8> {
    KeyBuf::new(KeyPrefix::Peer).peer(peer).build()
}

pub fn state_key(channel: &ChannelId, round: Round) -> Vec<u8> {
    KeyBuf::new(KeyPrefix::State).channel(channel).u64(round).build()
}

pub fn state_prefix(channel: &ChannelId) -> Vec<u8> {
    KeyBuf::new(KeyPrefix::State).channel(channel).build()
}

pub fn meta_key(name: &[u8]) -> Vec<u8> {
    KeyBuf::new(KeyPrefix::Meta).bytes(name).build()
}

/// Exclusive upper bound of every key starting with `prefix`.
pub fn prefix_end(prefix: &[u8]) -> Vec<u8> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.pop() {
        if last < u8::MAX {
            end.push(last + 1);
            return end;
        }
    }
    // All 0xff: nothing sorts after it within the prefix space.
    vec![u8::MAX; prefix.len() + 1]
}

/// Read a big-endian u64 at `offset`.
pub fn read_u64(key: &[u8], offset: usize, table: &'static str) -> Result<u64, StoreError> {
    key.get(offset..offset + 8)
        .and_then(|b| b.try_into().ok())
        .map(u64::from_be_bytes)
        .ok_or(StoreError::CorruptKey { table })
}

pub fn read_peer(key: &[u8], offset: usize, table: &'static str) -> Result<PeerId, StoreError> {
    key.get(offset..offset + 32)
        .and_then(|b| <[u8; 32]>::try_from(b).ok())
        .map(PeerId::new)
        .ok_or(StoreError::CorruptKey { table })
}

pub fn read_sig(bytes: &[u8], offset: usize, table: &'static str) -> Result<Signature, StoreError> {
    bytes
        .get(offset..offset + 64)
        .and_then(|b| <[u8; 64]>::try_from(b).ok())
        .map(Signature::new)
        .ok_or(StoreError::CorruptKey { table })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_big_endian_keys_sort_numerically() {
        let peer = PeerId::new([1; 32]);
        assert!(peer_height_key(&peer, 255) < peer_height_key(&peer, 256));
        assert!(peer_height_key(&peer, 9) < peer_height_key(&peer, 10));
    }

    #[test]
    fn test_prefix_end() {
        assert_eq!(prefix_end(&[1, 2, 3]), vec![1, 2, 4]);
        assert_eq!(prefix_end(&[1, 0xff]), vec![2]);
        assert!(prefix_end(&[0xff, 0xff]) > vec![0xff, 0xff, 0x00]);
    }

    #[test]
    fn test_readers() {
        let peer = PeerId::new([7; 32]);
        let key = peer_height_key(&peer, 42);
        assert_eq!(read_peer(&key, 1, "t").unwrap(), peer);
        assert_eq!(read_u64(&key, 33, "t").unwrap(), 42);
        assert!(read_u64(&key, 34, "t").is_err());
    }
}
