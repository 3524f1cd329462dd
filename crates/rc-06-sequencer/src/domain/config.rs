//! Sequencer configuration.

use serde::Deserialize;
use shared_types::Round;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SequencerConfig {
    /// Milliseconds per round.
    pub rate_ms: u64,
    /// Inputs are committed for the round this far in the future.
    pub input_delay_ms: u64,
    /// Nothing is committed until this long after the sequencer is created.
    pub warm_up_ms: u64,
    /// Commit unchanged nonzero input on rounds divisible by this.
    pub active_commit_every: u64,
    /// Commit unconditionally on rounds divisible by this.
    pub idle_commit_every: u64,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            rate_ms: 50,
            input_delay_ms: 100,
            warm_up_ms: 2000,
            active_commit_every: 10,
            idle_commit_every: 20,
        }
    }
}

impl SequencerConfig {
    /// Half a round, so no round is skipped.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis((self.rate_ms / 2).max(1))
    }

    /// Round to commit for at wall-clock `now_ms`, rounded to nearest.
    pub fn round_for(&self, now_ms: u64) -> Round {
        let rate = self.rate_ms.max(1);
        (now_ms.saturating_add(self.input_delay_ms) + rate / 2) / rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_is_half_the_rate() {
        assert_eq!(SequencerConfig::default().tick_interval(), Duration::from_millis(25));
    }

    #[test]
    fn test_round_for_rounds_to_nearest() {
        let config = SequencerConfig::default();
        // (1000 + 100) / 50 = 22
        assert_eq!(config.round_for(1_000), 22);
        assert_eq!(config.round_for(1_024), 22);
        assert_eq!(config.round_for(1_025), 23);
    }
}
