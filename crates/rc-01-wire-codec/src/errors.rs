use thiserror::Error;

/// Wire decoding/encoding failures. Always protocol errors: the caller drops
/// the frame and logs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("unknown type tag {0:#04x}")]
    UnknownTag(u8),

    #[error("malformed frame: {0}")]
    Malformed(String),
}

impl From<bincode::Error> for CodecError {
    fn from(err: bincode::Error) -> Self {
        CodecError::Malformed(err.to_string())
    }
}
