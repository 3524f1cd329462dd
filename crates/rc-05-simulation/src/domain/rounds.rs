//! Round arithmetic: processing ceilings and finalization thresholds.

use shared_types::Round;

/// Confirmations an input needs from other peers of an `n`-peer channel.
/// The author plus `n / 2` others form a majority.
pub fn required_confirmations_for(peer_count: usize) -> usize {
    peer_count / 2
}

/// Whether an input at `round` is old enough, relative to `ceiling`, that
/// only confirmed inputs count.
pub fn needs_finalization(ceiling: Round, round: Round, margin: Round) -> bool {
    ceiling.saturating_sub(round) > margin
}

/// Ceiling in `Wallclock` mode: the present, but never more than
/// `idle_timeout` rounds past the latest known input.
pub fn wallclock_limit(now: Round, latest_known: Option<Round>, idle_timeout: Round) -> Option<Round> {
    latest_known.map(|latest| now.min(latest.saturating_add(idle_timeout)))
}

/// Ceiling in `Cordial` mode: our own latest input minus the input delay.
pub fn cordial_limit(own_latest: Option<Round>, input_delay: Round) -> Option<Round> {
    own_latest.map(|own| own.saturating_sub(input_delay))
}
