//! Simulation results do not depend on the order messages arrive in.

use super::harness::*;
use node_runtime::{PeerNode, RuntimeConfig, StateSummary};
use rc_05_simulation::domain::arena::{DOWN, LEFT, RIGHT, STOP, UP};
use rc_05_simulation::ArenaGame;
use shared_bus::InMemorySwarm;
use shared_types::{ChainMessage, ChannelId, Round};

const CEILING: Round = 108;

struct Session {
    a: PeerNode,
    b: PeerNode,
    channel: ChannelId,
    a_chain: Vec<ChainMessage>,
    b_chain: Vec<ChainMessage>,
}

/// Two players on an unlinked swarm, each committing inputs for the same
/// rounds without seeing the other's.
async fn played_session(swarm: &InMemorySwarm) -> Session {
    let clock = clock_at_round(CEILING);
    let a = spawn_node(swarm, 1, clock.clone(), RuntimeConfig::default());
    let b = spawn_node(swarm, 2, clock.clone(), RuntimeConfig::default());

    let channel = a.create_channel("arena", None).await.unwrap();
    a.set_peers(channel, vec![a.peer_id(), b.peer_id()])
        .await
        .unwrap();
    b.join_channel(channel, None).await.unwrap();

    for (round, data) in [(101, UP), (102, UP | RIGHT), (104, RIGHT), (106, STOP)] {
        a.log().commit_input(channel, round, data).await.unwrap();
    }
    for (round, data) in [(101, LEFT), (102, DOWN), (103, DOWN | LEFT), (106, UP)] {
        b.log().commit_input(channel, round, data).await.unwrap();
    }

    let a_chain = chain_of(&a, &a.peer_id());
    let b_chain = chain_of(&b, &b.peer_id());
    Session {
        a,
        b,
        channel,
        a_chain,
        b_chain,
    }
}

#[tokio::test]
async fn test_delivery_order_does_not_change_state() {
    let swarm = InMemorySwarm::manual();
    let session = played_session(&swarm).await;
    let clock = clock_at_round(CEILING);
    let channel = session.channel;

    // Two spectators: one hears a first, the other hears b first and each
    // chain newest-first.
    let x = spawn_node(&swarm, 3, clock.clone(), RuntimeConfig::default());
    let y = spawn_node(&swarm, 4, clock.clone(), RuntimeConfig::default());
    x.join_channel(channel, None).await.unwrap();
    y.join_channel(channel, None).await.unwrap();

    deliver(&x, &session.a_chain);
    deliver(&x, &session.b_chain);
    deliver(&y, session.b_chain.iter().rev());
    deliver(&y, session.a_chain.iter().rev());

    // And the players themselves, each receiving the other's chain.
    deliver(&session.a, &session.b_chain);
    deliver(&session.b, &session.a_chain);

    let mut summaries = Vec::new();
    for node in [&x, &y, &session.a, &session.b] {
        let state = cue_until(node, &channel, CEILING).await;
        assert_eq!(state.state.inputs.len(), 2);
        summaries.push(StateSummary::of(&state));
    }
    assert!(summaries.windows(2).all(|pair| pair[0] == pair[1]));

    // Both avatars moved.
    let state = x.latest_state(&channel).unwrap();
    let arena = ArenaGame::decode(&state.state.data).unwrap();
    assert_eq!(arena.avatars.len(), 2);

    for node in [x, y, session.a, session.b] {
        node.shutdown().await;
    }
}

#[tokio::test]
async fn test_late_inputs_roll_back_to_the_same_state() {
    let swarm = InMemorySwarm::manual();
    let session = played_session(&swarm).await;
    let clock = clock_at_round(CEILING);
    let channel = session.channel;

    let x = spawn_node(&swarm, 3, clock.clone(), RuntimeConfig::default());
    let y = spawn_node(&swarm, 4, clock.clone(), RuntimeConfig::default());
    x.join_channel(channel, None).await.unwrap();
    y.join_channel(channel, None).await.unwrap();

    // x simulates past b's inputs before it has heard of them.
    deliver(&x, &session.a_chain);
    let early = cue_until(&x, &channel, CEILING).await;

    deliver(&x, &session.b_chain);
    let late = cue_until(&x, &channel, CEILING).await;
    assert_ne!(StateSummary::of(&early), StateSummary::of(&late));

    // y only ever saw the complete history.
    deliver(&y, &session.b_chain);
    deliver(&y, &session.a_chain);
    let complete = cue_until(&y, &channel, CEILING).await;
    assert_eq!(StateSummary::of(&late), StateSummary::of(&complete));

    for node in [x, y, session.a, session.b] {
        node.shutdown().await;
    }
}
