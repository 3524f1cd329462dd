//! Ports for the message log subsystem.

pub mod outbound;

pub use outbound::{GossipApi, InputObserver};
