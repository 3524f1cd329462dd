//! # Simulation (rc-05)
//!
//! Deterministic rollback simulation of a channel's game. Every peer replays
//! the same stored inputs through the same pure game step and therefore
//! reaches bit-identical states once their stores agree.
//!
//! ## Determinism Rules
//!
//! | Rule | Where |
//! |------|-------|
//! | Inputs fed in peer-id order, one slot per channel peer | `Simulation::replay` |
//! | Missing input = zero input | bucket defaults |
//! | Fixed `dt = rate / 1000` | `SimulationConfig::dt` |
//! | Old inputs count only with `n / 2` confirmations | `required_confirmations_for` |
//! | Late inputs and acks move the rollback floor back | `rollback_state` |
//! | Gaps abort the pass; nothing is written | `SimulationError::RoundGap` |
//!
//! ## Crate Structure (Hexagonal Architecture)
//!
//! - `domain/` - configuration, errors, round arithmetic, the arena game
//! - `ports/` - `SimulationApi` (inbound), `GameModule` (outbound)
//! - `service.rs` - `Simulation`
//! - `runner.rs` - `SimulationRunner`, the timer/notify driven loop

#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod domain;
pub mod ports;
pub mod runner;
pub mod service;

pub use domain::{
    required_confirmations_for, ArenaGame, ArenaState, RoundLimitMode, SimulationConfig,
    SimulationError,
};
pub use ports::{GameModule, SimulationApi};
pub use runner::SimulationRunner;
pub use service::Simulation;
