//! When a tick turns into a commit.

use super::config::SequencerConfig;
use shared_types::{InputBits, Round};

/// Throttling rule for input commits. Dense enough that peers stay in sync
/// and always have recent messages to acknowledge; sparse enough that an
/// idle player does not flood the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitPolicy {
    pub active_every: u64,
    pub idle_every: u64,
}

impl CommitPolicy {
    pub fn from_config(config: &SequencerConfig) -> Self {
        Self {
            active_every: config.active_commit_every.max(1),
            idle_every: config.idle_commit_every.max(1),
        }
    }

    /// `previous` is the last committed input, `None` before the first.
    pub fn can_write_input(&self, previous: Option<InputBits>, round: Round, input: InputBits) -> bool {
        match previous {
            None if input != 0 => true,
            Some(previous) if previous != input => true,
            _ => {
                (input != 0 && round % self.active_every == 0) || round % self.idle_every == 0
            }
        }
    }
}
