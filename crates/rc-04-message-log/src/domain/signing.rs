//! Chain message signing and verification.
//!
//! The signed bytes are the content hash of the canonical (key-sorted JSON)
//! encoding of every field except `sig`.

use shared_crypto::{CryptoFacade, Digest, KeyPair};
use shared_types::{canonical_json, CanonicalError, ChainMessage, Signature, UnsignedChainMessage};

pub fn chain_digest(
    crypto: &dyn CryptoFacade,
    unsigned: &UnsignedChainMessage,
) -> Result<Digest, CanonicalError> {
    Ok(crypto.hash(&canonical_json(unsigned)?))
}

pub fn sign_chain_message(
    crypto: &dyn CryptoFacade,
    identity: &KeyPair,
    unsigned: UnsignedChainMessage,
) -> Result<ChainMessage, CanonicalError> {
    let digest = chain_digest(crypto, &unsigned)?;
    let sig = crypto.sign(&digest, identity);
    Ok(unsigned.into_signed(Signature::new(sig)))
}

/// Whether `message.sig` verifies under `message.peer`. Never fails: any
/// encoding or key error counts as a mismatch.
pub fn verify_chain_message(crypto: &dyn CryptoFacade, message: &ChainMessage) -> bool {
    let Ok(digest) = chain_digest(crypto, &message.unsigned()) else {
        return false;
    };
    crypto
        .verify(message.sig.as_bytes(), &digest, message.peer.as_bytes())
        .unwrap_or(false)
}
