//! Node construction and polling helpers shared by the scenarios.

use node_runtime::{PeerNode, RuntimeConfig};
use shared_bus::InMemorySwarm;
use shared_crypto::KeyPair;
use shared_types::{ChainMessage, ChannelId, ManualTimeSource, PeerId, Round, SerializedState, TimeSource};
use std::sync::Arc;
use std::time::Duration;

/// Default round length.
pub const RATE_MS: u64 = 50;

/// A clock whose wallclock round is `round`.
pub fn clock_at_round(round: Round) -> Arc<ManualTimeSource> {
    Arc::new(ManualTimeSource::new(round * RATE_MS))
}

pub fn peer_id(seed: u8) -> PeerId {
    PeerId::new(KeyPair::from_seed([seed; 32]).public_key())
}

pub fn spawn_node(
    swarm: &InMemorySwarm,
    seed: u8,
    clock: Arc<dyn TimeSource>,
    config: RuntimeConfig,
) -> PeerNode {
    let identity = KeyPair::from_seed([seed; 32]);
    let transport = Arc::new(swarm.join(PeerId::new(identity.public_key())));
    PeerNode::new(config, identity, transport, clock).unwrap()
}

/// Poll `check` for up to five seconds.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..250 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

/// Cue until the simulation returns a state at exactly `round`. The runner
/// may hold the cue gate, so a `None` is retried.
pub async fn cue_until(node: &PeerNode, channel: &ChannelId, round: Round) -> SerializedState {
    for _ in 0..250 {
        if let Some(state) = node.cue(channel, round).unwrap() {
            if state.round == round {
                return state;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("no state at round {round}");
}

/// Everything `node` has stored from `author`, by height.
pub fn chain_of(node: &PeerNode, author: &PeerId) -> Vec<ChainMessage> {
    node.store().messages_by_peer(author, 0, u64::MAX).unwrap()
}

/// Hand `messages` to `node` as if each had arrived from its author.
pub fn deliver<'a>(node: &PeerNode, messages: impl IntoIterator<Item = &'a ChainMessage>) {
    for message in messages {
        node.log().receive(message.peer, message.clone()).unwrap();
    }
}
