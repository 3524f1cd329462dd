//! # Ports
//!
//! The ordered key-value backend the store needs from its host.

pub mod outbound;
