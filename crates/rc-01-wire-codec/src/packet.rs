//! Gossip frames.
//!
//! A frame carries either a batch of messages or one half of a direct
//! request/response exchange. Messages inside a frame keep their own
//! `[tag][fields]` encoding.

use crate::message::{decode_message, encode_message};
use crate::{bincode_options, CodecError};
use bincode::Options;
use shared_types::{ChainMessage, Message, PeerId, RpcRequest, RpcResponse};

pub const TAG_BATCH: u8 = 0x10;
pub const TAG_REQUEST: u8 = 0x11;
pub const TAG_RESPONSE: u8 = 0x12;

const REQUEST_MESSAGES_BY_HEIGHT: u8 = 1;
const RESPONSE_MESSAGES: u8 = 1;

/// One unit on a gossip topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Batch(Vec<Message>),
    Request { id: u64, request: RpcRequest },
    Response { id: u64, response: RpcResponse },
}

pub fn encode_packet(packet: &Packet) -> Result<Vec<u8>, CodecError> {
    let opts = bincode_options();
    let (tag, body) = match packet {
        Packet::Batch(messages) => {
            let encoded = messages
                .iter()
                .map(encode_message)
                .collect::<Result<Vec<_>, _>>()?;
            (TAG_BATCH, opts.serialize(&encoded)?)
        }
        Packet::Request { id, request } => match request {
            RpcRequest::MessagesByHeight {
                peer,
                from_height,
                to_height,
            } => (
                TAG_REQUEST,
                opts.serialize(&(id, REQUEST_MESSAGES_BY_HEIGHT, peer, from_height, to_height))?,
            ),
        },
        Packet::Response { id, response } => match response {
            RpcResponse::Messages(messages) => {
                let encoded = messages
                    .iter()
                    .map(|m| encode_message(&Message::Chain(m.clone())))
                    .collect::<Result<Vec<_>, _>>()?;
                (TAG_RESPONSE, opts.serialize(&(id, RESPONSE_MESSAGES, encoded))?)
            }
        },
    };

    let mut out = Vec::with_capacity(1 + body.len());
    out.push(tag);
    out.extend_from_slice(&body);
    Ok(out)
}

pub fn decode_packet(bytes: &[u8]) -> Result<Packet, CodecError> {
    let (&tag, body) = bytes
        .split_first()
        .ok_or_else(|| CodecError::Malformed("empty packet".into()))?;
    let opts = bincode_options();

    match tag {
        TAG_BATCH => {
            let encoded: Vec<Vec<u8>> = opts.deserialize(body)?;
            let messages = encoded
                .iter()
                .map(|m| decode_message(m))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Packet::Batch(messages))
        }
        TAG_REQUEST => {
            let (id, kind, peer, from_height, to_height): (u64, u8, PeerId, u64, u64) =
                opts.deserialize(body)?;
            if kind != REQUEST_MESSAGES_BY_HEIGHT {
                return Err(CodecError::Malformed(format!("unknown request kind {kind}")));
            }
            Ok(Packet::Request {
                id,
                request: RpcRequest::MessagesByHeight {
                    peer,
                    from_height,
                    to_height,
                },
            })
        }
        TAG_RESPONSE => {
            let (id, kind, encoded): (u64, u8, Vec<Vec<u8>>) = opts.deserialize(body)?;
            if kind != RESPONSE_MESSAGES {
                return Err(CodecError::Malformed(format!("unknown response kind {kind}")));
            }
            let messages = encoded
                .iter()
                .map(|m| match decode_message(m)? {
                    Message::Chain(chain) => Ok(chain),
                    other => Err(CodecError::Malformed(format!(
                        "{} in message response",
                        other.kind()
                    ))),
                })
                .collect::<Result<Vec<ChainMessage>, _>>()?;
            Ok(Packet::Response {
                id,
                response: RpcResponse::Messages(messages),
            })
        }
        other => Err(CodecError::UnknownTag(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::{ChainBody, ChannelId, Chat, Signature};

    fn input(height: u64) -> ChainMessage {
        ChainMessage {
            body: ChainBody::Input {
                round: 100 + height,
                channel: ChannelId::from_genesis(Signature::new([3; 64])),
                data: 0b0101,
            },
            peer: PeerId::new([4; 32]),
            parent: (height > 0).then(|| Signature::new([height as u8; 64])),
            height,
            acks: vec![Signature::new([8; 64])],
            sig: Signature::new([height as u8 + 1; 64]),
        }
    }

    #[test]
    fn test_batch_roundtrip() {
        let packet = Packet::Batch(vec![
            Message::Chain(input(0)),
            Message::Chat(Chat {
                id: 7,
                text: "hi".into(),
            }),
        ]);
        let bytes = encode_packet(&packet).unwrap();
        assert_eq!(bytes[0], TAG_BATCH);
        assert_eq!(decode_packet(&bytes).unwrap(), packet);
    }

    #[test]
    fn test_request_response_roundtrip() {
        let request = Packet::Request {
            id: 42,
            request: RpcRequest::MessagesByHeight {
                peer: PeerId::new([4; 32]),
                from_height: 1,
                to_height: 2,
            },
        };
        assert_eq!(decode_packet(&encode_packet(&request).unwrap()).unwrap(), request);

        let response = Packet::Response {
            id: 42,
            response: RpcResponse::Messages(vec![input(1), input(2)]),
        };
        assert_eq!(decode_packet(&encode_packet(&response).unwrap()).unwrap(), response);

        let empty = Packet::Response {
            id: 43,
            response: RpcResponse::empty(),
        };
        assert_eq!(decode_packet(&encode_packet(&empty).unwrap()).unwrap(), empty);
    }

    #[test]
    fn test_message_tag_is_not_a_packet() {
        let bytes = encode_message(&Message::Chain(input(0))).unwrap();
        assert_eq!(decode_packet(&bytes), Err(CodecError::UnknownTag(2)));
    }

    #[test]
    fn test_bad_inner_message_fails_whole_batch() {
        let opts = bincode_options();
        let mut bytes = vec![TAG_BATCH];
        bytes.extend(opts.serialize(&vec![vec![0x66u8, 1, 2]]).unwrap());
        assert_eq!(decode_packet(&bytes), Err(CodecError::UnknownTag(0x66)));
    }
}
