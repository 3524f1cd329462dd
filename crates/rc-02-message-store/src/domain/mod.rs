//! # Domain Layer
//!
//! Key layout, errors and configuration of the message store.

pub mod config;
pub mod errors;
pub mod keys;

pub use config::StoreConfig;
pub use errors::{KVStoreError, StoreError};
pub use keys::KeyPrefix;
