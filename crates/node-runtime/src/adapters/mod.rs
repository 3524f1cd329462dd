//! # Port Adapters
//!
//! Glue between subsystem ports. Each adapter implements one subsystem's
//! outbound port on top of another subsystem's service.
//!
//! | Adapter | Port | Backed by |
//! |---------|------|-----------|
//! | `LogInputCommitter` | `InputCommitter` (rc-06) | `MessageLog::commit_input` (rc-04) |
//! | `RunnerWakeObserver` | `InputObserver` (rc-04) | `SimulationRunner::wake` (rc-05) |
//! | `ScriptedInput` | `InputSource` (rc-06) | seeded random headings |

pub mod committer;
pub mod input;
pub mod observer;

pub use committer::LogInputCommitter;
pub use input::ScriptedInput;
pub use observer::RunnerWakeObserver;
