//! # Message Store (rc-02)
//!
//! The ordered keyed record store behind the message log and the
//! simulation: signed chain messages with their secondary indexes, channel
//! and peer records, and simulation checkpoints.
//!
//! ## Invariants
//!
//! | Invariant | Enforced by |
//! |-----------|-------------|
//! | One row per signature | `put_message` is idempotent by `sig` |
//! | `arrived` strictly increases | counter in the meta table, bumped per new row |
//! | All-or-nothing writes | `transaction` commits one atomic batch |
//! | Checkpoints are superseded, not deleted | `supersede_states_from` re-tags |
//!
//! ## Crate Structure (Hexagonal Architecture)
//!
//! - `domain/` - key layout, errors, configuration
//! - `ports/` - the ordered key-value backend (outbound)
//! - `store.rs` - `MessageStore` and its transactions
//!
//! ## Usage
//!
//! ```ignore
//! let store = MessageStore::in_memory();
//! let arrived = store.put_message(&signed)?;
//! let inputs = store.transaction(|t| t.inputs_in_range(&channel, 10, 20))?;
//! ```

#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod domain;
pub mod ports;
pub mod store;

pub use domain::{KVStoreError, KeyPrefix, StoreConfig, StoreError};
pub use ports::outbound::{BatchOperation, FileBackedKVStore, InMemoryKVStore, KeyValueStore};
pub use store::{MessageStore, StoreTxn};

/// Open the backend described by `config`.
pub fn open_store(config: &StoreConfig, name: &str) -> Result<MessageStore, StoreError> {
    let store = match &config.data_dir {
        Some(dir) => {
            let path = dir.join(format!("{name}.store"));
            MessageStore::new(Box::new(FileBackedKVStore::open(path)?))
        }
        None => MessageStore::in_memory(),
    };
    if config.reset_on_start {
        store.reset()?;
    }
    Ok(store)
}
