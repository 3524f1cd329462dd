//! # Gossip Channel (rc-03)
//!
//! Moves messages between the peers of a channel over a pub/sub transport.
//!
//! ## Responsibilities
//!
//! - Derive the channel's subcluster key and subscribe to it
//! - Batch peer joins and buffer inbound packets before handing them on
//! - Track peer liveness from the transport's connected set and from
//!   signed keep-alives
//! - Broadcast batches (`publish` when isolated, `stream` otherwise)
//! - Correlate direct requests with their responses, with a timeout
//!
//! ## Keep-Alive Rules
//!
//! | Rule | Effect |
//! |------|--------|
//! | Signature must verify | otherwise dropped and counted |
//! | Timestamp strictly newer than the last accepted | otherwise stale |
//! | `name` | set on first keep-alive that carries one, never changed |
//! | `sees` / `last_seen` | replaced on every accepted keep-alive |
//!
//! ## Crate Structure (Hexagonal Architecture)
//!
//! - `domain/` - configuration, errors, keep-alive signing, peer table
//! - `ports/` - `GossipApi` (inbound), `GossipHandler` and the transport
//!   (outbound)
//! - `service.rs` - `GossipService`, the per-node implementation

#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod domain;
pub mod ports;
pub mod service;

pub use domain::{GossipConfig, GossipError, KeepAliveOutcome, PeerTable};
pub use ports::{GossipApi, GossipHandler};
pub use service::{subcluster_key, GossipService};
