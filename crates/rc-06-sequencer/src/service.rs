//! # Sequencer Service
//!
//! Turns the local player's input into `Input` commits, one channel per
//! sequencer:
//!
//! ```text
//! every rate/2 ms
//!   ├─ warming up?              ─► skip
//!   ├─ round = round((now + delay) / rate)
//!   ├─ round already committed? ─► skip
//!   ├─ commit policy says no?   ─► skip
//!   └─ commit_input(channel, round, input)   (Busy ─► retry next tick)
//! ```

use crate::domain::{CommitPolicy, SequencerConfig, SequencerError, TickOutcome};
use crate::ports::{InputCommitter, InputSource};
use parking_lot::Mutex;
use rollcast_telemetry::SEQUENCER_TICKS;
use shared_types::{ChannelId, InputBits, Round, TimeSource};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

const SUBSYSTEM: &str = "sequencer";

#[derive(Debug, Default, Clone, Copy)]
struct LastCommit {
    round: Option<Round>,
    input: Option<InputBits>,
}

pub struct Sequencer {
    config: SequencerConfig,
    policy: CommitPolicy,
    channel: ChannelId,
    source: Arc<dyn InputSource>,
    committer: Arc<dyn InputCommitter>,
    clock: Arc<dyn TimeSource>,
    started_at: u64,
    last: Mutex<LastCommit>,
    shutdown: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Sequencer {
    pub fn new(
        config: SequencerConfig,
        channel: ChannelId,
        source: Arc<dyn InputSource>,
        committer: Arc<dyn InputCommitter>,
        clock: Arc<dyn TimeSource>,
    ) -> Arc<Self> {
        let (shutdown, _) = watch::channel(false);
        Arc::new(Self {
            policy: CommitPolicy::from_config(&config),
            started_at: clock.now_ms(),
            config,
            channel,
            source,
            committer,
            clock,
            last: Mutex::new(LastCommit::default()),
            shutdown,
            task: Mutex::new(None),
        })
    }

    pub fn channel(&self) -> &ChannelId {
        &self.channel
    }

    /// Last round committed by this sequencer.
    pub fn last_committed_round(&self) -> Option<Round> {
        self.last.lock().round
    }

    pub async fn tick(&self) -> Result<TickOutcome, SequencerError> {
        let outcome = self.tick_inner().await;
        let label = match &outcome {
            Ok(outcome) => outcome.label(),
            Err(_) => "error",
        };
        SEQUENCER_TICKS.with_label_values(&[label]).inc();
        outcome
    }

    async fn tick_inner(&self) -> Result<TickOutcome, SequencerError> {
        let now = self.clock.now_ms();
        if now < self.started_at.saturating_add(self.config.warm_up_ms) {
            return Ok(TickOutcome::WarmingUp);
        }

        let round = self.config.round_for(now);
        let last = *self.last.lock();
        if last.round.is_some_and(|committed| committed >= round) {
            return Ok(TickOutcome::SameRound);
        }

        let input = self.source.current_input();
        if !self.policy.can_write_input(last.input, round, input) {
            return Ok(TickOutcome::Throttled);
        }

        match self.committer.commit_input(self.channel, round, input).await {
            Ok(()) => {
                *self.last.lock() = LastCommit {
                    round: Some(round),
                    input: Some(input),
                };
                debug!(subsystem = SUBSYSTEM, channel = %self.channel, round, input, "Input committed");
                Ok(TickOutcome::Committed(round))
            }
            Err(SequencerError::Busy) => Ok(TickOutcome::Busy),
            Err(e) => Err(e),
        }
    }

    /// Spawn the tick loop. Calling it twice is a no-op.
    pub fn start(self: &Arc<Self>) {
        let mut task = self.task.lock();
        if task.is_some() {
            return;
        }
        let this = Arc::clone(self);
        let mut shutdown = self.shutdown.subscribe();
        *task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(this.config.tick_interval());
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = this.tick().await {
                            warn!(subsystem = SUBSYSTEM, channel = %this.channel, error = %e, "Tick failed");
                        }
                    }
                    _ = shutdown.changed() => break,
                }
            }
        }));
        info!(
            subsystem = SUBSYSTEM,
            channel = %self.channel,
            warm_up_ms = self.config.warm_up_ms,
            "Sequencer started"
        );
    }

    pub async fn shutdown(&self) {
        self.shutdown.send_replace(true);
        let task = self.task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }
}
