//! # Shared Types Crate
//!
//! Entities and small primitives shared by every Rollcast subsystem.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: message, channel, peer and checkpoint types
//!   are defined once, here.
//! - **Signature as Identity**: a chain message's `sig` is its only global
//!   identifier; a channel's id *is* its genesis signature.
//! - **No Globals**: caches, gates and clocks are values owned by the
//!   subsystem instance that uses them.

pub mod cache;
pub mod canonical;
pub mod entities;
pub mod errors;
pub mod gate;
pub mod time;

pub use cache::{IncrementalCache, LruCache};
pub use canonical::canonical_json;
pub use entities::*;
pub use errors::*;
pub use gate::{ExclusiveGate, GatePermit};
pub use time::{ManualTimeSource, SystemTimeSource, TimeSource};
