//! # Simulation Service
//!
//! One `Simulation` per channel. A cue runs four steps inside a single store
//! transaction, so a concurrent commit never observes a half-applied pass:
//!
//! ```text
//! cue(target)
//!   ├─ ceiling  = min(round limit, target)
//!   ├─ base     = rollback state at or before ceiling
//!   │             (lowered while late inputs or late acks invalidate it)
//!   ├─ replay   base+1 ..= ceiling, one input slot per channel peer
//!   └─ checkpoint every round in memory, every Nth round in the store
//! ```
//!
//! A gap (missing parent, discontinuous state) aborts the pass and nothing
//! from it is written.

use crate::domain::{
    cordial_limit, needs_finalization, required_confirmations_for, wallclock_limit,
    RoundLimitMode, SimulationConfig, SimulationError,
};
use crate::ports::{GameModule, SimulationApi};
use parking_lot::{Mutex, RwLock};
use rc_02_message_store::{MessageStore, StoreTxn};
use rollcast_telemetry::{
    log_round_event, CHECKPOINTS_PERSISTED, CUE_ABORTS, ROLLBACKS, ROLLBACK_DEPTH,
    ROUNDS_SIMULATED,
};
use shared_types::{
    ChainBody, ChainMessage, ChannelId, ExclusiveGate, GameSnapshot, IncrementalCache, PeerId,
    PlayerInput, Round, SerializedState, StateTag, StoredMessage, TimeSource,
};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use tracing::debug;

const SUBSYSTEM: &str = "simulation";

// Author chain entries read per step when walking back from an acked message.
const ACK_WALK_CHUNK: usize = 32;

// Who an input needs confirming by, and how many of them.
struct Finality {
    peers: Vec<PeerId>,
    needed: usize,
    margin: Round,
}

// Result of a successful pass, installed after the transaction commits.
struct Replay {
    base: SerializedState,
    states: VecDeque<SerializedState>,
    simulated: u64,
    persisted: u64,
}

impl Replay {
    fn new(base: SerializedState) -> Self {
        Self {
            base,
            states: VecDeque::new(),
            simulated: 0,
            persisted: 0,
        }
    }

    fn push(&mut self, state: SerializedState, keep: usize) {
        self.simulated += 1;
        self.states.push_back(state);
        while self.states.len() > keep.max(1) {
            self.states.pop_front();
        }
    }

    fn last(&self) -> &SerializedState {
        self.states.back().unwrap_or(&self.base)
    }
}

/// Deterministic rollback simulation of one channel.
pub struct Simulation {
    config: SimulationConfig,
    channel: ChannelId,
    local: PeerId,
    store: Arc<MessageStore>,
    game: Arc<dyn GameModule>,
    clock: Arc<dyn TimeSource>,
    gate: ExclusiveGate,
    cache: Mutex<IncrementalCache<SerializedState>>,
    latest: RwLock<Option<SerializedState>>,
}

impl Simulation {
    pub fn new(
        config: SimulationConfig,
        channel: ChannelId,
        local: PeerId,
        store: Arc<MessageStore>,
        game: Arc<dyn GameModule>,
        clock: Arc<dyn TimeSource>,
    ) -> Self {
        let cache = IncrementalCache::new(config.cache_capacity);
        Self {
            config,
            channel,
            local,
            store,
            game,
            clock,
            gate: ExclusiveGate::new(),
            cache: Mutex::new(cache),
            latest: RwLock::new(None),
        }
    }

    pub fn channel(&self) -> &ChannelId {
        &self.channel
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Highest round the simulation may process right now, or `None` when
    /// the channel has no inputs to go by.
    pub fn current_round_limit(&self) -> Result<Option<Round>, SimulationError> {
        self.store.transaction(|txn| self.round_limit_in(txn))
    }

    /// Newest still-valid checkpoint at or before `to_round`.
    pub fn rollback_state(&self, to_round: Round) -> Result<SerializedState, SimulationError> {
        self.store.transaction(|txn| {
            let finality = self.finality(txn)?;
            self.rollback_state_in(txn, &finality, to_round)
        })
    }

    /// Advance `state` by exactly one round.
    pub fn apply(
        &self,
        state: &SerializedState,
        round: Round,
        inputs: Vec<PlayerInput>,
        arrived: u64,
    ) -> Result<SerializedState, SimulationError> {
        let expected = state.round.saturating_add(1);
        if round != expected {
            return Err(SimulationError::StateDiscontinuity {
                expected,
                found: round,
            });
        }
        let data = self
            .game
            .step(&state.state.data, &inputs, self.config.dt())
            .map_err(SimulationError::Game)?;
        Ok(SerializedState {
            channel: self.channel,
            tag: StateTag::Accepted,
            round,
            arrived,
            ceiling: state.ceiling.max(round),
            state: GameSnapshot {
                t: round.saturating_mul(self.config.rate_ms),
                data,
                inputs,
            },
        })
    }

    fn round_limit_in(&self, txn: &StoreTxn<'_>) -> Result<Option<Round>, SimulationError> {
        Ok(match self.config.mode {
            RoundLimitMode::Wallclock => wallclock_limit(
                self.config.round_at(self.clock.now_ms()),
                txn.latest_input_round(&self.channel, None)?,
                self.config.idle_timeout_rounds,
            ),
            RoundLimitMode::Cordial => cordial_limit(
                txn.latest_input_round(&self.channel, Some(&self.local))?,
                self.config.input_delay_rounds(),
            ),
        })
    }

    fn finality(&self, txn: &StoreTxn<'_>) -> Result<Finality, SimulationError> {
        let peers = txn
            .get_channel(&self.channel)?
            .map(|channel| channel.sorted_peers())
            .unwrap_or_default();
        Ok(Finality {
            needed: required_confirmations_for(peers.len()),
            peers,
            margin: self.config.finalization_margin(),
        })
    }

    // `ceiling` is the processing ceiling of the pass that will build on the
    // returned state.
    fn rollback_state_in(
        &self,
        txn: &StoreTxn<'_>,
        finality: &Finality,
        ceiling: Round,
    ) -> Result<SerializedState, SimulationError> {
        let mut floor = ceiling;
        loop {
            let base = self.checkpoint_at_or_before(txn, floor)?;
            match self.invalidated_floor(txn, finality, &base, ceiling)? {
                Some(lowered) if lowered < floor => floor = lowered,
                _ => return Ok(base),
            }
        }
    }

    // Memory first, then the store, then a synthesised zero state.
    fn checkpoint_at_or_before(
        &self,
        txn: &StoreTxn<'_>,
        floor: Round,
    ) -> Result<SerializedState, SimulationError> {
        let cached = self.cache.lock().floor(floor).map(|(_, s)| s.clone());
        let stored = txn.latest_state_at_or_before(&self.channel, floor)?;
        Ok(match (cached, stored) {
            (Some(cached), Some(stored)) if stored.round > cached.round => stored,
            (Some(cached), _) => cached,
            (None, Some(stored)) => stored,
            (None, None) => self.zero_state(txn, floor)?,
        })
    }

    fn zero_state(&self, txn: &StoreTxn<'_>, floor: Round) -> Result<SerializedState, SimulationError> {
        let round = match txn.earliest_input_round(&self.channel)? {
            Some(earliest) => earliest.saturating_sub(1).min(floor),
            None => floor,
        };
        Ok(SerializedState {
            channel: self.channel,
            tag: StateTag::Accepted,
            round,
            arrived: 0,
            ceiling: round,
            state: GameSnapshot {
                t: round.saturating_mul(self.config.rate_ms),
                data: self.game.initial_state(),
                inputs: Vec::new(),
            },
        })
    }

    // Lowest round whose input decision differs between how `base` was
    // derived and how a pass up to `ceiling` would decide it now, minus one.
    //
    // Decisions change when inputs arrive late, when the peer set changes,
    // when late acks confirm an input through it or a later message of its
    // author, and when the ceiling moves an unconfirmed input across the
    // finalization margin in either direction.
    fn invalidated_floor(
        &self,
        txn: &StoreTxn<'_>,
        finality: &Finality,
        base: &SerializedState,
        ceiling: Round,
    ) -> Result<Option<Round>, SimulationError> {
        let mut earliest: Option<Round> = None;
        let mut touch = |round: Round| {
            if round <= base.round {
                earliest = Some(earliest.map_or(round, |e| e.min(round)));
            }
        };

        // Inputs the ceiling move pushes across the margin.
        let low = base.ceiling.min(ceiling).saturating_sub(finality.margin);
        let high = base.ceiling.max(ceiling).saturating_sub(finality.margin);
        if high > low {
            let to = (high - 1).min(base.round);
            for stored in txn.inputs_in_range(&self.channel, low.saturating_sub(1), to)? {
                let message = &stored.message;
                let Some(round) = message.input_round() else {
                    continue;
                };
                if finality.peers.binary_search(&message.peer).is_ok()
                    && self.decision_changed(txn, finality, message, round, base, ceiling)?
                {
                    touch(round);
                }
            }
        }

        // Walk each acked author back from the acked height until an input
        // that was already confirmed when `base` was derived.
        let mut walked: BTreeMap<PeerId, u64> = BTreeMap::new();
        for stored in txn.arrived_after(base.arrived)? {
            let message = &stored.message;
            if let ChainBody::SetPeers { channel, .. } = &message.body {
                if *channel == self.channel {
                    if let Some(round) = txn.earliest_input_round(&self.channel)? {
                        touch(round);
                    }
                }
            }
            if let Some(round) = self.channel_input_round(message) {
                touch(round);
            }
            if finality.needed == 0 || finality.peers.binary_search(&message.peer).is_err() {
                continue;
            }
            for ack in &message.acks {
                let Some(acked) = txn.get_message(ack)? else {
                    continue;
                };
                let author = acked.message.peer;
                if author == message.peer
                    || walked.get(&author).is_some_and(|top| *top >= acked.message.height)
                {
                    continue;
                }
                walked.insert(author, acked.message.height);

                let mut top = Some(acked.message.height);
                'walk: while let Some(from) = top {
                    let chunk = txn.recent_by_peer_from(&author, from, ACK_WALK_CHUNK)?;
                    top = match chunk.last() {
                        Some(lowest) if chunk.len() == ACK_WALK_CHUNK => {
                            lowest.message.height.checked_sub(1)
                        }
                        _ => None,
                    };
                    for older in &chunk {
                        let Some(round) = self.channel_input_round(&older.message) else {
                            continue;
                        };
                        if self.confirmed(txn, finality, &older.message, base.arrived)? {
                            break 'walk;
                        }
                        if self.decision_changed(txn, finality, &older.message, round, base, ceiling)? {
                            touch(round);
                        }
                    }
                }
            }
        }
        Ok(earliest.map(|round| round.saturating_sub(1)))
    }

    fn confirmed(
        &self,
        txn: &StoreTxn<'_>,
        finality: &Finality,
        message: &ChainMessage,
        as_of: u64,
    ) -> Result<bool, SimulationError> {
        if finality.needed == 0 {
            return Ok(true);
        }
        let count = txn.confirmations_as_of(&message.sig, &finality.peers, finality.needed, as_of)?;
        Ok(count >= finality.needed)
    }

    // Whether an input counts in a pass up to `ceiling`, judged by what the
    // store held at `as_of`.
    fn counts(
        &self,
        txn: &StoreTxn<'_>,
        finality: &Finality,
        message: &ChainMessage,
        round: Round,
        ceiling: Round,
        as_of: u64,
    ) -> Result<bool, SimulationError> {
        Ok(!needs_finalization(ceiling, round, finality.margin)
            || self.confirmed(txn, finality, message, as_of)?)
    }

    fn decision_changed(
        &self,
        txn: &StoreTxn<'_>,
        finality: &Finality,
        message: &ChainMessage,
        round: Round,
        base: &SerializedState,
        ceiling: Round,
    ) -> Result<bool, SimulationError> {
        let then = self.counts(txn, finality, message, round, base.ceiling, base.arrived)?;
        let now = self.counts(txn, finality, message, round, ceiling, u64::MAX)?;
        Ok(then != now)
    }

    fn channel_input_round(&self, message: &ChainMessage) -> Option<Round> {
        message
            .input_round()
            .filter(|_| message.channel() == self.channel)
    }

    fn replay(
        &self,
        txn: &mut StoreTxn<'_>,
        target: Round,
    ) -> Result<Option<Replay>, SimulationError> {
        let Some(limit) = self.round_limit_in(txn)? else {
            return Ok(None);
        };
        let ceiling = limit.min(target);
        let finality = self.finality(txn)?;
        let base = self.rollback_state_in(txn, &finality, ceiling)?;
        let mut replay = Replay::new(base.clone());
        if base.round >= ceiling {
            return Ok(Some(replay));
        }

        let peers = &finality.peers;
        let interval = self.config.checkpoint_interval.max(1);
        let arrived = txn.current_arrived()?;

        let inputs: Vec<StoredMessage> = txn
            .inputs_in_range(&self.channel, base.round, ceiling)?
            .into_iter()
            .filter(|stored| peers.binary_search(&stored.message.peer).is_ok())
            .collect();
        for stored in &inputs {
            let message = &stored.message;
            if let Some(parent) = &message.parent {
                if !txn.has_message(parent)? {
                    return Err(SimulationError::RoundGap {
                        channel: self.channel,
                        peer: message.peer,
                        round: message.input_round().unwrap_or(base.round),
                    });
                }
            }
        }

        txn.supersede_states_from(&self.channel, base.round + 1)?;

        let mut pending = inputs.into_iter().peekable();
        let mut state = base;
        for round in state.round + 1..=ceiling {
            let mut bucket: Vec<PlayerInput> = peers
                .iter()
                .map(|peer| PlayerInput {
                    peer: *peer,
                    data: 0,
                })
                .collect();
            while let Some(stored) = pending.next_if(|s| s.message.input_round() == Some(round)) {
                let message = &stored.message;
                let ChainBody::Input { data, .. } = &message.body else {
                    continue;
                };
                if !self.counts(txn, &finality, message, round, ceiling, u64::MAX)? {
                    log_round_event!(
                        debug,
                        SUBSYSTEM,
                        "Dropping unconfirmed input",
                        self.channel,
                        round,
                        peer_id = %message.peer.short()
                    );
                    continue;
                }
                if let Ok(slot) = peers.binary_search(&message.peer) {
                    bucket[slot].data = *data;
                }
            }

            state = self.apply(&state, round, bucket, arrived)?;
            state.ceiling = ceiling;
            if round % interval == 0 {
                txn.put_state(&state)?;
                replay.persisted += 1;
            }
            replay.push(state.clone(), self.config.cache_capacity);
        }
        Ok(Some(replay))
    }

    fn install(&self, replay: Replay) -> SerializedState {
        let last = replay.last().clone();
        if replay.simulated == 0 {
            let mut latest = self.latest.write();
            if latest.is_none() {
                *latest = Some(last.clone());
            }
            return last;
        }

        let previous = self.latest.read().as_ref().map(|s| s.round);
        {
            let mut cache = self.cache.lock();
            cache.truncate_after(replay.base.round);
            for state in replay.states {
                cache.insert(state.round, state);
            }
        }
        if let Some(previous) = previous.filter(|p| *p > replay.base.round) {
            let depth = previous - replay.base.round;
            ROLLBACKS.inc();
            ROLLBACK_DEPTH.observe(depth as f64);
            log_round_event!(
                debug,
                SUBSYSTEM,
                "Rolled back",
                self.channel,
                replay.base.round,
                depth = depth
            );
        }
        ROUNDS_SIMULATED.inc_by(replay.simulated as f64);
        if replay.persisted > 0 {
            CHECKPOINTS_PERSISTED.inc_by(replay.persisted as f64);
        }
        *self.latest.write() = Some(last.clone());
        last
    }
}

impl SimulationApi for Simulation {
    fn cue(&self, target: Round) -> Result<Option<SerializedState>, SimulationError> {
        let Some(_permit) = self.gate.try_enter() else {
            debug!(subsystem = SUBSYSTEM, channel = %self.channel, "Cue already running");
            return Ok(None);
        };
        match self.store.transaction(|txn| self.replay(txn, target)) {
            Ok(Some(replay)) => Ok(Some(self.install(replay))),
            Ok(None) => Ok(None),
            Err(e) => {
                CUE_ABORTS.with_label_values(&[e.reason()]).inc();
                log_round_event!(
                    error,
                    SUBSYSTEM,
                    "Cue aborted",
                    self.channel,
                    target,
                    error = %e
                );
                Err(e)
            }
        }
    }

    fn latest_state(&self) -> Option<SerializedState> {
        self.latest.read().clone()
    }
}
