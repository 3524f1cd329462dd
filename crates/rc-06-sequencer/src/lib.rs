//! # Sequencer (rc-06)
//!
//! Commits the local player's input for the round `input_delay` ahead of the
//! wall clock. Rounds come from the clock, not from a counter, so peers agree
//! on round numbers without coordinating.
//!
//! ## Commit Policy
//!
//! | Condition | Commit? |
//! |-----------|---------|
//! | Within the warm-up period | no |
//! | Round already committed | no |
//! | First nonzero input | yes |
//! | Input changed since the last commit | yes |
//! | Nonzero input and `round % 10 == 0` | yes |
//! | `round % 20 == 0` | yes |
//!
//! ## Crate Structure (Hexagonal Architecture)
//!
//! - `domain/` - configuration, errors, `CommitPolicy`, `TickOutcome`
//! - `ports/` - `InputSource` and `InputCommitter` (outbound)
//! - `service.rs` - `Sequencer`

#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod domain;
pub mod ports;
pub mod service;

pub use domain::{CommitPolicy, SequencerConfig, SequencerError, TickOutcome};
pub use ports::{InputCommitter, InputSource};
pub use service::Sequencer;
