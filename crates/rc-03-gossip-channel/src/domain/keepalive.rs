//! Keep-alive signing and verification.
//!
//! A keep-alive is signed over the hash of the canonical encoding of its
//! unsigned fields, the same way chain messages are.

use crate::domain::GossipError;
use shared_crypto::{CryptoFacade, KeyPair};
use shared_types::{canonical_json, KeepAlive, PeerId, Signature, UnsignedKeepAlive};

pub fn sign_keep_alive(
    crypto: &dyn CryptoFacade,
    identity: &KeyPair,
    timestamp: u64,
    sees: Vec<PeerId>,
    name: Option<String>,
) -> Result<KeepAlive, GossipError> {
    let unsigned = UnsignedKeepAlive {
        peer: PeerId::new(identity.public_key()),
        timestamp,
        sees,
        name,
    };
    let digest = crypto.hash(&canonical_json(&unsigned)?);
    let sig = crypto.sign(&digest, identity);
    Ok(unsigned.into_signed(Signature::new(sig)))
}

/// True if `keep_alive.sig` is its author's signature over its fields.
pub fn verify_keep_alive(crypto: &dyn CryptoFacade, keep_alive: &KeepAlive) -> bool {
    let Ok(bytes) = canonical_json(&keep_alive.unsigned()) else {
        return false;
    };
    let digest = crypto.hash(&bytes);
    crypto
        .verify(
            keep_alive.sig.as_bytes(),
            &digest,
            keep_alive.peer.as_bytes(),
        )
        .unwrap_or(false)
}
