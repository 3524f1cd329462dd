//! # Shared Crypto
//!
//! The cryptographic capability consumed by the message log and the gossip
//! layer. Callers program against [`CryptoFacade`]; [`DefaultCrypto`] backs
//! it with Ed25519 and BLAKE3.
//!
//! ## Components
//!
//! | Module | Algorithm | Use Case |
//! |--------|-----------|----------|
//! | `signatures` | Ed25519 | Peer identity, detached message signatures |
//! | `hashing` | BLAKE3 | Canonical content hash, subcluster key derivation |
//! | `facade` | - | `sign` / `verify` / `hash` / `create_*` contract |
//!
//! ## Security Properties
//!
//! - **Ed25519**: Deterministic nonces, no RNG dependency when signing
//! - **BLAKE3**: Keyed and derive-key modes for domain separation

#![warn(clippy::all)]

pub mod errors;
pub mod facade;
pub mod hashing;
pub mod signatures;

pub use errors::CryptoError;
pub use facade::{CryptoFacade, DefaultCrypto};
pub use hashing::{blake3_derive_key, blake3_hash, Digest};
pub use signatures::{KeyPair, PUBLIC_KEY_LEN, SIGNATURE_LEN};
