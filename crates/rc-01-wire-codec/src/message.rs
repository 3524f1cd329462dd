//! Message encoding.

use crate::{bincode_options, CodecError};
use bincode::Options;
use shared_types::{
    ChainBody, ChainMessage, ChannelId, Chat, InputBits, KeepAlive, Message, PeerId, Round,
    Signature,
};

pub const TAG_CREATE_CHANNEL: u8 = 1;
pub const TAG_INPUT: u8 = 2;
pub const TAG_SET_PEERS: u8 = 3;
pub const TAG_KEEP_ALIVE: u8 = 4;
pub const TAG_CHAT: u8 = 5;

type CreateChannelFields = (String, PeerId, Option<Signature>, u64, Vec<Signature>, Signature);

type InputFields = (
    Round,
    ChannelId,
    InputBits,
    PeerId,
    Option<Signature>,
    u64,
    Vec<Signature>,
    Signature,
);

type SetPeersFields = (
    ChannelId,
    Vec<PeerId>,
    PeerId,
    Option<Signature>,
    u64,
    Vec<Signature>,
    Signature,
);

type KeepAliveFields = (u64, Vec<PeerId>, Option<String>, PeerId, Signature);

type ChatFields = (u64, String);

/// Encode a message as `[tag][fields]`.
pub fn encode_message(message: &Message) -> Result<Vec<u8>, CodecError> {
    let opts = bincode_options();
    let (tag, fields) = match message {
        Message::Chain(m) => match &m.body {
            ChainBody::CreateChannel { name } => (
                TAG_CREATE_CHANNEL,
                opts.serialize(&(name, m.peer, m.parent, m.height, &m.acks, m.sig))?,
            ),
            ChainBody::Input {
                round,
                channel,
                data,
            } => (
                TAG_INPUT,
                opts.serialize(&(
                    round, channel, data, m.peer, m.parent, m.height, &m.acks, m.sig,
                ))?,
            ),
            ChainBody::SetPeers { channel, peers } => (
                TAG_SET_PEERS,
                opts.serialize(&(channel, peers, m.peer, m.parent, m.height, &m.acks, m.sig))?,
            ),
        },
        Message::KeepAlive(k) => (
            TAG_KEEP_ALIVE,
            opts.serialize(&(k.timestamp, &k.sees, &k.name, k.peer, k.sig))?,
        ),
        Message::Chat(c) => (TAG_CHAT, opts.serialize(&(c.id, &c.text))?),
    };

    let mut out = Vec::with_capacity(1 + fields.len());
    out.push(tag);
    out.extend_from_slice(&fields);
    Ok(out)
}

/// Decode a message produced by [`encode_message`].
pub fn decode_message(bytes: &[u8]) -> Result<Message, CodecError> {
    let (&tag, fields) = bytes
        .split_first()
        .ok_or_else(|| CodecError::Malformed("empty frame".into()))?;
    let opts = bincode_options();

    let message = match tag {
        TAG_CREATE_CHANNEL => {
            let (name, peer, parent, height, acks, sig): CreateChannelFields =
                opts.deserialize(fields)?;
            chain(ChainBody::CreateChannel { name }, peer, parent, height, acks, sig)
        }
        TAG_INPUT => {
            let (round, channel, data, peer, parent, height, acks, sig): InputFields =
                opts.deserialize(fields)?;
            chain(
                ChainBody::Input {
                    round,
                    channel,
                    data,
                },
                peer,
                parent,
                height,
                acks,
                sig,
            )
        }
        TAG_SET_PEERS => {
            let (channel, peers, peer, parent, height, acks, sig): SetPeersFields =
                opts.deserialize(fields)?;
            chain(
                ChainBody::SetPeers { channel, peers },
                peer,
                parent,
                height,
                acks,
                sig,
            )
        }
        TAG_KEEP_ALIVE => {
            let (timestamp, sees, name, peer, sig): KeepAliveFields = opts.deserialize(fields)?;
            Message::KeepAlive(KeepAlive {
                peer,
                timestamp,
                sees,
                name,
                sig,
            })
        }
        TAG_CHAT => {
            let (id, text): ChatFields = opts.deserialize(fields)?;
            Message::Chat(Chat { id, text })
        }
        other => return Err(CodecError::UnknownTag(other)),
    };
    Ok(message)
}

fn chain(
    body: ChainBody,
    peer: PeerId,
    parent: Option<Signature>,
    height: u64,
    acks: Vec<Signature>,
    sig: Signature,
) -> Message {
    Message::Chain(ChainMessage {
        body,
        peer,
        parent,
        height,
        acks,
        sig,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sig(n: u8) -> Signature {
        Signature::new([n; 64])
    }

    fn genesis() -> Message {
        Message::Chain(ChainMessage {
            body: ChainBody::CreateChannel {
                name: "arena".into(),
            },
            peer: PeerId::new([1; 32]),
            parent: None,
            height: 0,
            acks: vec![],
            sig: sig(9),
        })
    }

    #[test]
    fn test_leading_tag_matches_type() {
        assert_eq!(encode_message(&genesis()).unwrap()[0], TAG_CREATE_CHANNEL);
        let chat = Message::Chat(Chat {
            id: 1,
            text: "gg".into(),
        });
        assert_eq!(encode_message(&chat).unwrap()[0], TAG_CHAT);
    }

    #[test]
    fn test_extremal_chain_message_roundtrip() {
        let msg = genesis();
        assert_eq!(decode_message(&encode_message(&msg).unwrap()).unwrap(), msg);
    }

    #[test]
    fn test_unknown_tag_is_rejected() {
        let mut bytes = encode_message(&genesis()).unwrap();
        bytes[0] = 0x7f;
        assert_eq!(decode_message(&bytes), Err(CodecError::UnknownTag(0x7f)));
    }

    #[test]
    fn test_empty_and_truncated_are_malformed() {
        assert!(matches!(decode_message(&[]), Err(CodecError::Malformed(_))));
        let bytes = encode_message(&genesis()).unwrap();
        assert!(matches!(
            decode_message(&bytes[..bytes.len() - 3]),
            Err(CodecError::Malformed(_))
        ));
    }

    #[test]
    fn test_trailing_bytes_are_malformed() {
        let mut bytes = encode_message(&genesis()).unwrap();
        bytes.push(0);
        assert!(matches!(
            decode_message(&bytes),
            Err(CodecError::Malformed(_))
        ));
    }

    #[test]
    fn test_huge_length_prefix_is_malformed() {
        // Chat with a string length far beyond the frame limit.
        let mut bytes = vec![TAG_CHAT, 1];
        bytes.extend_from_slice(&[0xfd, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x7f]);
        assert!(matches!(
            decode_message(&bytes),
            Err(CodecError::Malformed(_))
        ));
    }

    fn arb_peer() -> impl Strategy<Value = PeerId> {
        any::<[u8; 32]>().prop_map(PeerId::new)
    }

    fn arb_sig() -> impl Strategy<Value = Signature> {
        (any::<[u8; 32]>(), any::<[u8; 32]>()).prop_map(|(a, b)| {
            let mut bytes = [0u8; 64];
            bytes[..32].copy_from_slice(&a);
            bytes[32..].copy_from_slice(&b);
            Signature::new(bytes)
        })
    }

    fn arb_body() -> impl Strategy<Value = ChainBody> {
        prop_oneof![
            ".{0,24}".prop_map(|name| ChainBody::CreateChannel { name }),
            (any::<u64>(), arb_sig(), any::<u32>()).prop_map(|(round, s, data)| {
                ChainBody::Input {
                    round,
                    channel: ChannelId::from_genesis(s),
                    data,
                }
            }),
            (arb_sig(), prop::collection::vec(arb_peer(), 0..5)).prop_map(|(s, peers)| {
                ChainBody::SetPeers {
                    channel: ChannelId::from_genesis(s),
                    peers,
                }
            }),
        ]
    }

    fn arb_message() -> impl Strategy<Value = Message> {
        let chain_msg = (
            arb_body(),
            arb_peer(),
            prop::option::of(arb_sig()),
            any::<u64>(),
            prop::collection::vec(arb_sig(), 0..6),
            arb_sig(),
        )
            .prop_map(|(body, peer, parent, height, acks, sig)| {
                Message::Chain(ChainMessage {
                    body,
                    peer,
                    parent,
                    height,
                    acks,
                    sig,
                })
            });
        let keep_alive = (
            any::<u64>(),
            prop::collection::vec(arb_peer(), 0..4),
            prop::option::of("[a-z]{1,12}"),
            arb_peer(),
            arb_sig(),
        )
            .prop_map(|(timestamp, sees, name, peer, sig)| {
                Message::KeepAlive(KeepAlive {
                    peer,
                    timestamp,
                    sees,
                    name,
                    sig,
                })
            });
        let chat = (any::<u64>(), ".{0,64}").prop_map(|(id, text)| Message::Chat(Chat { id, text }));
        prop_oneof![chain_msg, keep_alive, chat]
    }

    proptest! {
        #[test]
        fn test_roundtrip_every_variant(msg in arb_message()) {
            let bytes = encode_message(&msg).unwrap();
            prop_assert_eq!(decode_message(&bytes).unwrap(), msg);
        }

        #[test]
        fn test_decode_never_panics(bytes in prop::collection::vec(any::<u8>(), 0..256)) {
            let _ = decode_message(&bytes);
        }
    }
}
