//! Simulation domain: configuration, errors, round arithmetic and the demo
//! arena game.

pub mod arena;
pub mod config;
pub mod errors;
pub mod rounds;

pub use arena::{ArenaGame, ArenaState, Avatar};
pub use config::{RoundLimitMode, SimulationConfig};
pub use errors::SimulationError;
pub use rounds::{cordial_limit, needs_finalization, required_confirmations_for, wallclock_limit};
