//! Simulation configuration.

use serde::Deserialize;
use shared_types::Round;
use std::time::Duration;

/// How far ahead of the inputs the simulation is allowed to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundLimitMode {
    /// Up to the wall clock, at most `idle_timeout_rounds` past the latest
    /// known input.
    Wallclock,
    /// Up to the local peer's own latest input minus the input delay.
    Cordial,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Milliseconds per round.
    pub rate_ms: u64,
    /// How far ahead of the wall clock inputs are committed.
    pub input_delay_ms: u64,
    /// Finalization lag factor.
    pub interlace: u64,
    /// Rounds simulated past the latest input in `Wallclock` mode.
    pub idle_timeout_rounds: u64,
    /// Every this many rounds a checkpoint is persisted to the store.
    pub checkpoint_interval: u64,
    /// States kept in the in-memory incremental cache.
    pub cache_capacity: usize,
    pub mode: RoundLimitMode,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            rate_ms: 50,
            input_delay_ms: 100,
            interlace: 2,
            idle_timeout_rounds: 40,
            checkpoint_interval: 200,
            cache_capacity: 512,
            mode: RoundLimitMode::Wallclock,
        }
    }
}

impl SimulationConfig {
    pub fn rate(&self) -> Duration {
        Duration::from_millis(self.rate_ms.max(1))
    }

    /// Fixed step handed to the game module, in seconds.
    pub fn dt(&self) -> f64 {
        self.rate_ms as f64 / 1000.0
    }

    pub fn input_delay_rounds(&self) -> Round {
        self.input_delay_ms / self.rate_ms.max(1)
    }

    /// Inputs further than this behind the ceiling need confirmations.
    pub fn finalization_margin(&self) -> Round {
        self.interlace * 3 + 2
    }

    pub fn round_at(&self, now_ms: u64) -> Round {
        now_ms / self.rate_ms.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SimulationConfig::default();
        assert_eq!(config.input_delay_rounds(), 2);
        assert_eq!(config.finalization_margin(), 8);
        assert_eq!(config.dt(), 0.05);
        assert_eq!(config.round_at(1_049), 20);
    }

    #[test]
    fn test_zero_rate_does_not_divide_by_zero() {
        let config = SimulationConfig {
            rate_ms: 0,
            ..Default::default()
        };
        assert_eq!(config.round_at(10), 10);
        assert_eq!(config.rate(), Duration::from_millis(1));
    }
}
