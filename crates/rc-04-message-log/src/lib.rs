//! # Message Log (rc-04)
//!
//! Each peer owns an append-only chain of signed messages. This crate signs
//! and stores the local chain, and verifies, deduplicates and stores the
//! chains of everyone else.
//!
//! ## Chain Rules
//!
//! | Rule | Enforced by |
//! |------|-------------|
//! | Heights are `0, 1, 2, ...` with `parent` = previous `sig` | chain cursor in `commit` |
//! | One commit at a time | `ExclusiveGate`; a second caller gets `LogError::Busy` |
//! | Signature covers every field but `sig` | `sign_chain_message` / `verify_chain_message` |
//! | Acks name at most 2 recent messages per known peer | `select_ackable` |
//! | Same-round inputs are never acked | `AckFilter` |
//! | Invalid signatures are never stored | `receive` |
//! | Missing parents trigger a height-range request | gap fill in `receive` |
//!
//! ## Crate Structure (Hexagonal Architecture)
//!
//! - `domain/` - configuration, errors, events, signing, ack selection
//! - `ports/` - gossip (outbound) and input observers
//! - `service.rs` - `MessageLog`, which also serves as the gossip handler

#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod domain;
pub mod ports;
pub mod service;

pub use domain::{
    chain_digest, select_ackable, sign_chain_message, verify_chain_message, AckFilter, LogConfig,
    LogError, LogEvent,
};
pub use ports::{GossipApi, InputObserver};
pub use service::{MessageLog, Received};
