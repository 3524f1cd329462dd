//! Sequencer domain: configuration, errors and the commit policy.

pub mod config;
pub mod errors;
pub mod policy;

pub use config::SequencerConfig;
pub use errors::SequencerError;
pub use policy::CommitPolicy;

use shared_types::Round;

/// What one tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    WarmingUp,
    /// This round (or a later one) was already committed.
    SameRound,
    /// The commit policy skipped this round.
    Throttled,
    Committed(Round),
    /// The log was busy; nothing recorded, the next tick retries.
    Busy,
}

impl TickOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            TickOutcome::WarmingUp => "warming_up",
            TickOutcome::SameRound => "same_round",
            TickOutcome::Throttled => "throttled",
            TickOutcome::Committed(_) => "committed",
            TickOutcome::Busy => "busy",
        }
    }
}
