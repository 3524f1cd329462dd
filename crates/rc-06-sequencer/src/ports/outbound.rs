//! Outbound ports: where input comes from and where it goes.

use crate::domain::SequencerError;
use async_trait::async_trait;
use shared_types::{ChannelId, InputBits, Round};

/// The local player's current input.
pub trait InputSource: Send + Sync {
    fn current_input(&self) -> InputBits;
}

/// Appends an `Input` to the local chain.
#[async_trait]
pub trait InputCommitter: Send + Sync {
    async fn commit_input(
        &self,
        channel: ChannelId,
        round: Round,
        data: InputBits,
    ) -> Result<(), SequencerError>;
}
