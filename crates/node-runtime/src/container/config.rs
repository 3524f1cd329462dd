//! # Runtime Configuration
//!
//! One document for every subsystem plus the local session parameters.
//!
//! ## Load Order
//!
//! 1. Defaults (each subsystem's `Default`)
//! 2. Optional TOML file (`--config <path>` or `ROLLCAST_CONFIG`)
//! 3. Environment overrides (`ROLLCAST_PEERS`, `ROLLCAST_RATE_MS`,
//!    `ROLLCAST_SESSION_SECS`, `ROLLCAST_CHANNEL_NAME`)
//! 4. `validate()`

use rc_02_message_store::StoreConfig;
use rc_03_gossip_channel::GossipConfig;
use rc_04_message_log::LogConfig;
use rc_05_simulation::SimulationConfig;
use rc_06_sequencer::SequencerConfig;
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;
use tracing::warn;

/// Complete node configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub store: StoreConfig,
    pub gossip: GossipConfig,
    pub log: LogConfig,
    pub simulation: SimulationConfig,
    pub sequencer: SequencerConfig,
    pub session: SessionConfig,
}

/// Parameters of the local multi-peer session run by the binary.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Local nodes joined to the in-memory swarm.
    pub peers: usize,
    /// How long the session runs before shutting down.
    pub session_secs: u64,
    /// Name of the channel node 0 creates.
    pub channel_name: String,
    /// Seed for identities and scripted input. `None` draws one.
    pub seed: Option<u64>,
    /// Sequencer reads between heading changes of the scripted input.
    pub input_hold_ticks: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            peers: 3,
            session_secs: 10,
            channel_name: "arena".to_string(),
            seed: None,
            input_hold_ticks: 40,
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {key}: {value}")]
    InvalidEnv { key: &'static str, value: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl RuntimeConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Apply overrides from a variable lookup. `lookup` is `std::env::var`
    /// in the binary and a map in tests.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("ROLLCAST_PEERS") {
            self.session.peers = parse_env("ROLLCAST_PEERS", value)?;
        }
        if let Some(value) = lookup("ROLLCAST_RATE_MS") {
            let rate = parse_env("ROLLCAST_RATE_MS", value)?;
            self.simulation.rate_ms = rate;
            self.sequencer.rate_ms = rate;
        }
        if let Some(value) = lookup("ROLLCAST_SESSION_SECS") {
            self.session.session_secs = parse_env("ROLLCAST_SESSION_SECS", value)?;
        }
        if let Some(value) = lookup("ROLLCAST_CHANNEL_NAME") {
            self.session.channel_name = value;
        }
        Ok(())
    }

    /// Reject values the subsystems cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session.peers == 0 {
            return Err(ConfigError::Invalid("session.peers must be at least 1".into()));
        }
        if self.session.channel_name.is_empty() {
            return Err(ConfigError::Invalid("session.channel_name is empty".into()));
        }
        if self.simulation.rate_ms == 0 || self.sequencer.rate_ms == 0 {
            return Err(ConfigError::Invalid("rate_ms must be positive".into()));
        }
        if self.simulation.rate_ms != self.sequencer.rate_ms {
            return Err(ConfigError::Invalid(format!(
                "simulation.rate_ms ({}) and sequencer.rate_ms ({}) differ",
                self.simulation.rate_ms, self.sequencer.rate_ms
            )));
        }
        if self.simulation.input_delay_ms != self.sequencer.input_delay_ms {
            warn!(
                simulation = self.simulation.input_delay_ms,
                sequencer = self.sequencer.input_delay_ms,
                "Input delay differs between simulation and sequencer"
            );
        }
        if self.simulation.checkpoint_interval == 0 {
            return Err(ConfigError::Invalid(
                "simulation.checkpoint_interval must be positive".into(),
            ));
        }
        if self.log.ackable_per_peer == 0 {
            return Err(ConfigError::Invalid("log.ackable_per_peer must be positive".into()));
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidEnv { key, value })
}
