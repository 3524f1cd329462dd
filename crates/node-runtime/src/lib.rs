//! # Node Runtime Library
//!
//! This library exposes the node assembly for the binary and the integration
//! suite. The main entry point is the `main.rs` binary.
//!
//! ## Architectural Patterns
//!
//! - **Hexagonal Architecture**: each subsystem defines its ports, the
//!   adapters here implement them on top of the other subsystems
//! - **One node, many channels**: a `PeerNode` owns one log and opens a
//!   simulation session per joined channel

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod adapters;
pub mod container;

pub use container::{
    ChannelSession, ConfigError, NodeError, PeerNode, RuntimeConfig, SessionConfig, StateSummary,
};
