//! # Rollcast Test Suite
//!
//! Unified test crate containing:
//!
//! ## Structure
//!
//! ```text
//! tests/
//! ├── benches/          # Criterion benchmarks (codec, signing, store, replay)
//! └── src/integration/  # Multi-node scenarios over the in-memory swarm
//!     ├── harness.rs      # node construction and polling helpers
//!     ├── sync.rs         # chain synchronisation between logs
//!     ├── ackable.rs      # acknowledgement frontier
//!     ├── determinism.rs  # delivery-order independence and rollback
//!     └── gaps.rs         # replay aborts on missing history
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! # All tests
//! cargo test -p rc-tests
//!
//! # By scenario
//! cargo test -p rc-tests integration::determinism::
//!
//! # Benchmarks
//! cargo bench -p rc-tests
//! ```

#![allow(dead_code)]

pub mod integration;
