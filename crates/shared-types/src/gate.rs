//! Single-occupancy gate.
//!
//! Guards operations that must never overlap on one instance (`commit` on a
//! message log, `cue` on a simulation). A second caller is turned away
//! immediately instead of queueing.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// A one-permit semaphore handing out RAII permits.
#[derive(Clone)]
pub struct ExclusiveGate {
    permits: Arc<Semaphore>,
}

/// Proof of occupancy. The gate reopens when this is dropped.
#[derive(Debug)]
pub struct GatePermit {
    _permit: OwnedSemaphorePermit,
}

impl ExclusiveGate {
    pub fn new() -> Self {
        Self {
            permits: Arc::new(Semaphore::new(1)),
        }
    }

    /// Enter the gate, or `None` if someone is already inside.
    pub fn try_enter(&self) -> Option<GatePermit> {
        Arc::clone(&self.permits)
            .try_acquire_owned()
            .ok()
            .map(|permit| GatePermit { _permit: permit })
    }

    pub fn is_busy(&self) -> bool {
        self.permits.available_permits() == 0
    }
}

impl Default for ExclusiveGate {
    fn default() -> Self {
        Self::new()
    }
}
