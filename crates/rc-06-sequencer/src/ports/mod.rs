//! Ports for the sequencer subsystem.

pub mod outbound;

pub use outbound::{InputCommitter, InputSource};
