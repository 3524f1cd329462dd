//! Outbound port: the deterministic game step.

use shared_types::PlayerInput;

/// A game whose state is an opaque byte string.
///
/// `step` must be a pure function of its arguments: same bytes, same inputs
/// in the same order and same `dt` give the same result on every peer.
pub trait GameModule: Send + Sync {
    fn initial_state(&self) -> Vec<u8>;

    /// Advance one round. `inputs` hold one slot per channel peer, ordered
    /// by peer id; `dt` is the round length in seconds.
    fn step(&self, data: &[u8], inputs: &[PlayerInput], dt: f64) -> Result<Vec<u8>, String>;
}
