//! Message log domain: configuration, errors, events, signing and the
//! ack-selection rule.

pub mod ackable;
pub mod config;
pub mod errors;
pub mod events;
pub mod signing;

pub use ackable::{select_ackable, AckFilter};
pub use config::LogConfig;
pub use errors::LogError;
pub use events::LogEvent;
pub use signing::{chain_digest, sign_chain_message, verify_chain_message};
