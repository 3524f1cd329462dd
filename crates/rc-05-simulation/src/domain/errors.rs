//! Simulation error types.

use rc_02_message_store::StoreError;
use shared_types::{ChannelId, PeerId, Round};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimulationError {
    /// An input in range has a parent that is not stored; the author's
    /// history is incomplete.
    #[error("Missing history for {peer:?} before round {round} in {channel}")]
    RoundGap {
        channel: ChannelId,
        peer: PeerId,
        round: Round,
    },

    #[error("State discontinuity: expected round {expected}, got {found}")]
    StateDiscontinuity { expected: Round, found: Round },

    #[error("Game step failed: {0}")]
    Game(String),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

impl SimulationError {
    /// Label for the cue-abort counter.
    pub fn reason(&self) -> &'static str {
        match self {
            SimulationError::RoundGap { .. } => "round_gap",
            SimulationError::StateDiscontinuity { .. } => "state_discontinuity",
            SimulationError::Game(_) => "game",
            SimulationError::Store(_) => "store",
        }
    }
}
