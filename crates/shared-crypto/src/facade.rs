//! The crypto capability as seen by the subsystems.

use crate::hashing::{blake3_derive_key, blake3_hash, Digest};
use crate::signatures::{verify_detached, KeyPair, SIGNATURE_LEN};
use crate::CryptoError;

const SHARED_KEY_CONTEXT: &str = "rollcast 2026 subcluster shared key v1";

/// Key generation, detached signing, detached verification and content
/// hashing behind one contract.
pub trait CryptoFacade: Send + Sync {
    fn create_key_pair(&self) -> KeyPair;

    fn sign(&self, bytes: &[u8], key: &KeyPair) -> [u8; SIGNATURE_LEN];

    /// `Ok(false)` for a mismatch, `Err` for structurally invalid input.
    fn verify(&self, sig: &[u8], bytes: &[u8], public_key: &[u8]) -> Result<bool, CryptoError>;

    fn hash(&self, bytes: &[u8]) -> Digest;

    /// Random 32-byte identifier (RPC correlation, session ids).
    fn create_id(&self) -> [u8; 32];

    /// Deterministic key shared by everyone who knows `seed`.
    fn create_shared_key(&self, seed: &[u8]) -> [u8; 32];
}

/// Ed25519 + BLAKE3.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultCrypto;

impl CryptoFacade for DefaultCrypto {
    fn create_key_pair(&self) -> KeyPair {
        KeyPair::generate()
    }

    fn sign(&self, bytes: &[u8], key: &KeyPair) -> [u8; SIGNATURE_LEN] {
        key.sign(bytes)
    }

    fn verify(&self, sig: &[u8], bytes: &[u8], public_key: &[u8]) -> Result<bool, CryptoError> {
        verify_detached(public_key, bytes, sig)
    }

    fn hash(&self, bytes: &[u8]) -> Digest {
        blake3_hash(bytes)
    }

    fn create_id(&self) -> [u8; 32] {
        rand::random()
    }

    fn create_shared_key(&self, seed: &[u8]) -> [u8; 32] {
        blake3_derive_key(SHARED_KEY_CONTEXT, seed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_then_verify_over_hash() {
        let crypto = DefaultCrypto;
        let key = crypto.create_key_pair();
        let digest = crypto.hash(b"{\"height\":0}");
        let sig = crypto.sign(&digest, &key);
        assert_eq!(crypto.verify(&sig, &digest, &key.public_key()), Ok(true));
    }

    #[test]
    fn test_shared_key_is_deterministic() {
        let crypto = DefaultCrypto;
        assert_eq!(
            crypto.create_shared_key(b"chan"),
            crypto.create_shared_key(b"chan")
        );
        assert_ne!(
            crypto.create_shared_key(b"chan"),
            crypto.create_shared_key(b"other")
        );
    }

    #[test]
    fn test_ids_are_unique() {
        let crypto = DefaultCrypto;
        assert_ne!(crypto.create_id(), crypto.create_id());
    }
}
