//! Ports for the simulation subsystem.

pub mod inbound;
pub mod outbound;

pub use inbound::SimulationApi;
pub use outbound::GameModule;
