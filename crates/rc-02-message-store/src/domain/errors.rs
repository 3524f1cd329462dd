//! # Domain Errors
//!
//! Error types for the message store.

use thiserror::Error;

/// Errors raised by the underlying key-value backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KVStoreError {
    #[error("I/O error: {message}")]
    IOError { message: String },

    #[error("backend error: {message}")]
    Backend { message: String },
}

/// Errors that can occur during store operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Backend read/write failure.
    #[error("database error: {0}")]
    Database(#[from] KVStoreError),

    /// A stored value could not be encoded or decoded.
    #[error("serialization error: {message}")]
    Serialization { message: String },

    /// A key did not have the expected layout.
    #[error("corrupt key in table {table}")]
    CorruptKey { table: &'static str },
}

impl From<bincode::Error> for StoreError {
    fn from(err: bincode::Error) -> Self {
        StoreError::Serialization {
            message: err.to_string(),
        }
    }
}
