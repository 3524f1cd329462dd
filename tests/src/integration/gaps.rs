//! A hole in an author's chain aborts replay without touching checkpoints.

use super::harness::*;
use node_runtime::RuntimeConfig;
use rc_02_message_store::StoreError;
use rc_05_simulation::domain::arena::{LEFT, UP};
use rc_05_simulation::{SimulationApi, SimulationError};
use shared_bus::InMemorySwarm;
use shared_types::{ChannelId, Round, SerializedState, StateTag};
use std::time::Duration;

fn stored_checkpoint(node: &node_runtime::PeerNode, channel: &ChannelId) -> Option<SerializedState> {
    node.store()
        .transaction(|txn| txn.latest_state_at_or_before(channel, Round::MAX))
        .unwrap()
}

#[tokio::test]
async fn test_missing_parent_aborts_cue_and_keeps_checkpoints() {
    let swarm = InMemorySwarm::manual();
    let clock = clock_at_round(104);
    let a = spawn_node(&swarm, 1, clock.clone(), RuntimeConfig::default());

    let mut config = RuntimeConfig::default();
    config.simulation.checkpoint_interval = 2;
    let x = spawn_node(&swarm, 2, clock.clone(), config);

    let channel = a.create_channel("arena", None).await.unwrap();
    a.set_peers(channel, vec![a.peer_id()]).await.unwrap();
    for (round, data) in [(101, UP), (102, UP), (103, LEFT), (105, LEFT), (106, UP)] {
        a.log().commit_input(channel, round, data).await.unwrap();
    }
    let chain = chain_of(&a, &a.peer_id());
    assert_eq!(chain.len(), 7);

    // Everything up to round 103, simulated through round 104.
    x.join_channel(channel, None).await.unwrap();
    deliver(&x, &chain[..5]);
    let before = cue_until(&x, &channel, 104).await;
    let checkpoint = stored_checkpoint(&x, &channel).unwrap();
    assert_eq!(checkpoint.round, 104);
    assert_eq!(checkpoint.tag, StateTag::Accepted);

    // Round 106 arrives without the round-105 message it chains from.
    deliver(&x, &chain[6..]);
    clock.set(107 * RATE_MS);
    let simulation = x.session(&channel).unwrap().simulation().clone();
    let mut aborted = false;
    for _ in 0..250 {
        match simulation.cue(107) {
            Err(SimulationError::RoundGap { peer, round, .. }) => {
                assert_eq!(peer, a.peer_id());
                assert_eq!(round, 106);
                aborted = true;
                break;
            }
            Ok(None) => tokio::time::sleep(Duration::from_millis(10)).await,
            other => panic!("unexpected cue result: {other:?}"),
        }
    }
    assert!(aborted);

    // Nothing from the aborted pass was kept.
    assert_eq!(stored_checkpoint(&x, &channel), Some(checkpoint));
    assert_eq!(x.latest_state(&channel), Some(before));

    // Once the hole is filled the same cue goes through.
    deliver(&x, &chain[5..6]);
    let after = cue_until(&x, &channel, 107).await;
    assert_eq!(after.round, 107);
    assert_eq!(stored_checkpoint(&x, &channel).unwrap().round, 106);

    a.shutdown().await;
    x.shutdown().await;
}
