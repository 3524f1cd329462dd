//! Gossip domain: configuration, errors, keep-alives and the peer table.

pub mod config;
pub mod errors;
pub mod keepalive;
pub mod peer_table;

pub use config::GossipConfig;
pub use errors::GossipError;
pub use keepalive::{sign_keep_alive, verify_keep_alive};
pub use peer_table::{KeepAliveOutcome, PeerTable};
