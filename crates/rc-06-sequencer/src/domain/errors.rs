//! Sequencer error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SequencerError {
    /// The log was committing something else; retried on the next tick.
    #[error("Commit already in progress")]
    Busy,

    #[error("Commit failed: {0}")]
    Commit(String),
}
