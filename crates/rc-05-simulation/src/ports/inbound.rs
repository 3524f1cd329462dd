//! Inbound port: what drivers of a simulation call.

use crate::domain::SimulationError;
use shared_types::{Round, SerializedState};

pub trait SimulationApi: Send + Sync {
    /// Bring the simulation as close to `target` as the round limit allows.
    ///
    /// `Ok(None)` means another cue is running or there is nothing to
    /// simulate yet; callers retry later.
    fn cue(&self, target: Round) -> Result<Option<SerializedState>, SimulationError>;

    /// The newest state produced by a successful cue.
    fn latest_state(&self) -> Option<SerializedState>;
}
