//! # Node Container
//!
//! Configuration and assembly of one peer's subsystems.
//!
//! - `config` - `RuntimeConfig`: every subsystem's settings in one document
//! - `node` - `PeerNode`: store, gossip, log and per-channel simulation and
//!   sequencer, wired through the adapters

pub mod config;
pub mod node;

pub use config::{ConfigError, RuntimeConfig, SessionConfig};
pub use node::{ChannelSession, NodeError, PeerNode, StateSummary};
