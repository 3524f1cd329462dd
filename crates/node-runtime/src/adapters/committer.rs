//! Sequencer commits go straight into the message log.

use async_trait::async_trait;
use rc_04_message_log::{LogError, MessageLog};
use rc_06_sequencer::{InputCommitter, SequencerError};
use shared_types::{ChannelId, InputBits, Round};
use std::sync::Arc;

pub struct LogInputCommitter {
    log: Arc<MessageLog>,
}

impl LogInputCommitter {
    pub fn new(log: Arc<MessageLog>) -> Self {
        Self { log }
    }
}

#[async_trait]
impl InputCommitter for LogInputCommitter {
    async fn commit_input(
        &self,
        channel: ChannelId,
        round: Round,
        data: InputBits,
    ) -> Result<(), SequencerError> {
        match self.log.commit_input(channel, round, data).await {
            Ok(_) => Ok(()),
            Err(LogError::Busy) => Err(SequencerError::Busy),
            Err(e) => Err(SequencerError::Commit(e.to_string())),
        }
    }
}
