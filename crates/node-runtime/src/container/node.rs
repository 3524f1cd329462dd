//! # Peer Node
//!
//! One peer's full stack over a `PeerTransport`:
//!
//! ```text
//! PeerTransport ─► GossipService ─► MessageLog ─► MessageStore
//!                                        │
//!                          InputObserver ▼
//!              per channel: SimulationRunner ─► Simulation
//!                           Sequencer ─► LogInputCommitter ─► MessageLog
//! ```
//!
//! The log is the gossip handler; the service only holds a `Weak` to it so
//! dropping the node tears the cycle down.

use crate::adapters::{LogInputCommitter, RunnerWakeObserver};
use crate::container::config::RuntimeConfig;
use parking_lot::Mutex;
use rc_02_message_store::{open_store, MessageStore, StoreError};
use rc_03_gossip_channel::{GossipApi, GossipHandler, GossipService};
use rc_04_message_log::{LogError, MessageLog};
use rc_05_simulation::{ArenaGame, GameModule, Simulation, SimulationApi, SimulationRunner};
use rc_06_sequencer::{InputSource, Sequencer};
use shared_bus::PeerTransport;
use shared_crypto::{blake3_hash, CryptoFacade, DefaultCrypto, KeyPair};
use shared_types::{ChannelId, PeerId, Round, SerializedState, TimeSource};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tracing::info;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Message log error: {0}")]
    Log(#[from] LogError),

    #[error("No session for channel {0}")]
    NoSession(ChannelId),
}

/// Round and content hash of a simulation state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateSummary {
    pub round: Round,
    pub hash: String,
}

impl StateSummary {
    pub fn of(state: &SerializedState) -> Self {
        Self {
            round: state.round,
            hash: hex::encode(blake3_hash(&state.state.data)),
        }
    }
}

/// Simulation, runner and (for playing peers) sequencer of one channel.
pub struct ChannelSession {
    simulation: Arc<Simulation>,
    runner: Arc<SimulationRunner>,
    sequencer: Option<Arc<Sequencer>>,
}

impl ChannelSession {
    pub fn simulation(&self) -> &Arc<Simulation> {
        &self.simulation
    }

    pub fn sequencer(&self) -> Option<&Arc<Sequencer>> {
        self.sequencer.as_ref()
    }

    pub fn states(&self) -> watch::Receiver<Option<SerializedState>> {
        self.runner.subscribe()
    }

    async fn shutdown(&self) {
        if let Some(sequencer) = &self.sequencer {
            sequencer.shutdown().await;
        }
        self.runner.shutdown().await;
    }
}

pub struct PeerNode {
    config: RuntimeConfig,
    peer: PeerId,
    clock: Arc<dyn TimeSource>,
    store: Arc<MessageStore>,
    gossip: GossipService,
    log: Arc<MessageLog>,
    wake: Arc<RunnerWakeObserver>,
    game: Arc<dyn GameModule>,
    sessions: Mutex<HashMap<ChannelId, Arc<ChannelSession>>>,
}

impl PeerNode {
    /// Assemble every subsystem and start the log's background loop.
    /// Must be called inside a tokio runtime.
    pub fn new(
        config: RuntimeConfig,
        identity: KeyPair,
        transport: Arc<dyn PeerTransport>,
        clock: Arc<dyn TimeSource>,
    ) -> Result<Self, NodeError> {
        let identity = Arc::new(identity);
        let peer = PeerId::new(identity.public_key());
        let crypto: Arc<dyn CryptoFacade> = Arc::new(DefaultCrypto);
        let store = Arc::new(open_store(&config.store, &peer.to_string())?);

        let gossip = GossipService::new(
            config.gossip.clone(),
            transport,
            Arc::clone(&crypto),
            Arc::clone(&identity),
            Arc::clone(&clock),
        );
        let log = MessageLog::new(
            config.log.clone(),
            identity,
            crypto,
            Arc::clone(&store),
            Arc::new(gossip.clone()),
            Arc::clone(&clock),
        );
        let handler: Arc<dyn GossipHandler> = log.clone();
        gossip.set_handler(Arc::downgrade(&handler));

        let wake = Arc::new(RunnerWakeObserver::new());
        log.set_input_observer(wake.clone());
        log.start();

        info!(peer_id = %peer.short(), "Peer node assembled");
        Ok(Self {
            config,
            peer,
            clock,
            store,
            gossip,
            log,
            wake,
            game: Arc::new(ArenaGame),
            sessions: Mutex::new(HashMap::new()),
        })
    }

    pub fn peer_id(&self) -> PeerId {
        self.peer
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn log(&self) -> &Arc<MessageLog> {
        &self.log
    }

    pub fn store(&self) -> &Arc<MessageStore> {
        &self.store
    }

    pub fn gossip(&self) -> &GossipService {
        &self.gossip
    }

    /// Found a channel and start simulating it. `input` makes this node a
    /// player; without it the node only spectates.
    pub async fn create_channel(
        &self,
        name: &str,
        input: Option<Arc<dyn InputSource>>,
    ) -> Result<ChannelId, NodeError> {
        let channel = self.log.create_channel(name).await?;
        self.open_session(channel, input);
        Ok(channel)
    }

    /// Join a channel founded elsewhere and start simulating it.
    pub async fn join_channel(
        &self,
        channel: ChannelId,
        input: Option<Arc<dyn InputSource>>,
    ) -> Result<(), NodeError> {
        self.log.join_channel(channel).await?;
        self.open_session(channel, input);
        Ok(())
    }

    pub async fn set_peers(&self, channel: ChannelId, peers: Vec<PeerId>) -> Result<(), NodeError> {
        self.log.set_peers(channel, peers).await?;
        Ok(())
    }

    pub fn session(&self, channel: &ChannelId) -> Option<Arc<ChannelSession>> {
        self.sessions.lock().get(channel).cloned()
    }

    /// Run one simulation pass now instead of waiting for the runner.
    pub fn cue(&self, channel: &ChannelId, target: Round) -> Result<Option<SerializedState>, NodeError> {
        let session = self
            .session(channel)
            .ok_or(NodeError::NoSession(*channel))?;
        // Failures are logged and counted inside the simulation.
        Ok(session.simulation.cue(target).ok().flatten())
    }

    pub fn latest_state(&self, channel: &ChannelId) -> Option<SerializedState> {
        self.session(channel)
            .and_then(|session| session.simulation.latest_state())
    }

    pub fn state_summary(&self, channel: &ChannelId) -> Option<StateSummary> {
        self.latest_state(channel).map(|state| StateSummary::of(&state))
    }

    /// Stop simulating `channel` and leave its gossip group.
    pub async fn close_channel(&self, channel: &ChannelId) -> Result<(), NodeError> {
        let session = self
            .sessions
            .lock()
            .remove(channel)
            .ok_or(NodeError::NoSession(*channel))?;
        self.wake.unregister(channel);
        session.shutdown().await;
        self.gossip.leave(channel).await;
        info!(peer_id = %self.peer.short(), channel = %channel, "Channel closed");
        Ok(())
    }

    pub async fn shutdown(&self) {
        let sessions: Vec<(ChannelId, Arc<ChannelSession>)> =
            self.sessions.lock().drain().collect();
        for (channel, session) in sessions {
            self.wake.unregister(&channel);
            session.shutdown().await;
        }
        self.log.shutdown().await;
        info!(peer_id = %self.peer.short(), "Peer node shut down");
    }

    fn open_session(&self, channel: ChannelId, input: Option<Arc<dyn InputSource>>) {
        let mut sessions = self.sessions.lock();
        if sessions.contains_key(&channel) {
            return;
        }

        let simulation = Arc::new(Simulation::new(
            self.config.simulation.clone(),
            channel,
            self.peer,
            Arc::clone(&self.store),
            Arc::clone(&self.game),
            Arc::clone(&self.clock),
        ));
        let runner = Arc::new(SimulationRunner::new(
            simulation.clone(),
            self.config.simulation.rate(),
        ));
        self.wake.register(channel, Arc::clone(&runner));
        runner.start();

        let sequencer = input.map(|source| {
            let sequencer = Sequencer::new(
                self.config.sequencer.clone(),
                channel,
                source,
                Arc::new(LogInputCommitter::new(Arc::clone(&self.log))),
                Arc::clone(&self.clock),
            );
            sequencer.start();
            sequencer
        });

        info!(
            peer_id = %self.peer.short(),
            channel = %channel,
            playing = sequencer.is_some(),
            "Channel session opened"
        );
        sessions.insert(
            channel,
            Arc::new(ChannelSession {
                simulation,
                runner,
                sequencer,
            }),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::ScriptedInput;
    use rc_05_simulation::domain::arena::{LEFT, UP};
    use shared_bus::InMemorySwarm;
    use shared_types::{ManualTimeSource, SystemTimeSource};
    use std::time::Duration;

    // Rounds are 50 ms, so the wallclock ceiling sits at round 105.
    const NOW_MS: u64 = 105 * 50;

    fn node(
        swarm: &InMemorySwarm,
        seed: u8,
        config: RuntimeConfig,
        clock: Arc<dyn TimeSource>,
    ) -> PeerNode {
        let identity = KeyPair::from_seed([seed; 32]);
        let transport = Arc::new(swarm.join(PeerId::new(identity.public_key())));
        PeerNode::new(config, identity, transport, clock).unwrap()
    }

    async fn eventually(mut check: impl FnMut() -> bool) -> bool {
        for _ in 0..200 {
            if check() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }

    fn head_height(node: &PeerNode, of: &PeerId) -> Option<u64> {
        node.store()
            .last_by_peer(of)
            .unwrap()
            .map(|stored| stored.message.height)
    }

    async fn cue_until(node: &PeerNode, channel: &ChannelId, round: Round) -> SerializedState {
        for _ in 0..200 {
            if let Some(state) = node.cue(channel, round).unwrap() {
                if state.round == round {
                    return state;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("no state at round {round}");
    }

    #[tokio::test]
    async fn test_two_nodes_agree_on_state() {
        let swarm = InMemorySwarm::fully_connected();
        let clock: Arc<dyn TimeSource> = Arc::new(ManualTimeSource::new(NOW_MS));
        let a = node(&swarm, 1, RuntimeConfig::default(), Arc::clone(&clock));
        let b = node(&swarm, 2, RuntimeConfig::default(), Arc::clone(&clock));

        let channel = a.create_channel("arena", None).await.unwrap();
        b.join_channel(channel, None).await.unwrap();
        a.set_peers(channel, vec![a.peer_id(), b.peer_id()])
            .await
            .unwrap();

        for (round, data) in [(100, UP), (101, UP | LEFT), (102, 0)] {
            a.log().commit_input(channel, round, data).await.unwrap();
            b.log().commit_input(channel, round, LEFT).await.unwrap();
        }

        // a: genesis, set-peers, three inputs. b: three inputs.
        let (a_id, b_id) = (a.peer_id(), b.peer_id());
        assert!(
            eventually(|| head_height(&a, &b_id) == Some(2) && head_height(&b, &a_id) == Some(4))
                .await
        );

        let on_a = cue_until(&a, &channel, 105).await;
        let on_b = cue_until(&b, &channel, 105).await;
        assert_eq!(StateSummary::of(&on_a), StateSummary::of(&on_b));
        assert_eq!(on_a.state.inputs.len(), 2);

        a.shutdown().await;
        b.shutdown().await;
    }

    #[tokio::test]
    async fn test_playing_node_commits_and_simulates() {
        let swarm = InMemorySwarm::fully_connected();
        let mut config = RuntimeConfig::default();
        config.sequencer.warm_up_ms = 0;
        let a = node(&swarm, 3, config, Arc::new(SystemTimeSource));

        let input: Arc<dyn InputSource> = Arc::new(ScriptedInput::new(9, 4));
        let channel = a.create_channel("solo", Some(input)).await.unwrap();
        a.set_peers(channel, vec![a.peer_id()]).await.unwrap();
        assert!(a.session(&channel).unwrap().sequencer().is_some());

        let a_id = a.peer_id();
        assert!(eventually(|| head_height(&a, &a_id).unwrap_or(0) >= 4).await);
        assert!(eventually(|| a.state_summary(&channel).is_some()).await);

        a.shutdown().await;
        assert!(a.session(&channel).is_none());
    }

    #[tokio::test]
    async fn test_close_channel() {
        let swarm = InMemorySwarm::fully_connected();
        let a = node(&swarm, 4, RuntimeConfig::default(), Arc::new(ManualTimeSource::new(NOW_MS)));
        let channel = a.create_channel("arena", None).await.unwrap();
        assert!(a.session(&channel).is_some());

        a.close_channel(&channel).await.unwrap();
        assert!(a.session(&channel).is_none());
        assert!(a.gossip().joined_channels().is_empty());
        assert!(matches!(
            a.close_channel(&channel).await,
            Err(NodeError::NoSession(_))
        ));
        assert!(matches!(a.cue(&channel, 10), Err(NodeError::NoSession(_))));
        a.shutdown().await;
    }

    #[test]
    fn test_state_summary_hashes_bytes() {
        let state = SerializedState {
            channel: ChannelId::from_genesis(shared_types::Signature::new([1; 64])),
            tag: shared_types::StateTag::Accepted,
            round: 7,
            arrived: 3,
            ceiling: 7,
            state: shared_types::GameSnapshot {
                t: 350,
                data: vec![1, 2, 3],
                inputs: Vec::new(),
            },
        };
        let summary = StateSummary::of(&state);
        assert_eq!(summary.round, 7);
        assert_eq!(summary.hash, hex::encode(blake3_hash(&[1, 2, 3])));
    }
}
