//! Two logs that committed while apart converge once linked.

use super::harness::*;
use node_runtime::RuntimeConfig;
use rc_05_simulation::domain::arena::{DOWN, LEFT, RIGHT, UP};
use shared_bus::InMemorySwarm;
use shared_types::ChainBody;

#[tokio::test]
async fn test_logs_converge_after_connect() {
    let swarm = InMemorySwarm::manual();
    let clock = clock_at_round(200);
    let a = spawn_node(&swarm, 1, clock.clone(), RuntimeConfig::default());
    let b = spawn_node(&swarm, 2, clock.clone(), RuntimeConfig::default());

    let channel = a.create_channel("arena", None).await.unwrap();
    b.join_channel(channel, None).await.unwrap();

    for (round, data) in [(101, UP), (102, LEFT), (103, UP | RIGHT)] {
        a.log().commit_input(channel, round, data).await.unwrap();
    }
    for (round, data) in [(101, DOWN), (102, DOWN), (103, 0)] {
        b.log().commit_input(channel, round, data).await.unwrap();
    }
    // Nothing crossed while the swarm had no links.
    assert!(chain_of(&b, &a.peer_id()).is_empty());
    assert!(chain_of(&a, &b.peer_id()).is_empty());

    assert!(swarm.connect(a.peer_id(), b.peer_id()));

    let (a_id, b_id) = (a.peer_id(), b.peer_id());
    assert!(
        eventually(|| {
            chain_of(&b, &a_id) == chain_of(&a, &a_id) && chain_of(&a, &b_id) == chain_of(&b, &b_id)
        })
        .await
    );

    let a_chain = chain_of(&b, &a_id);
    assert_eq!(a_chain.len(), 4);
    assert!(matches!(a_chain[0].body, ChainBody::CreateChannel { .. }));
    for (height, message) in a_chain.iter().enumerate() {
        assert_eq!(message.height, height as u64);
    }
    assert_eq!(chain_of(&a, &b_id).len(), 3);

    // The genesis arrived with the chain, so b now knows the channel by name.
    let known = b.log().channel(&channel).unwrap().unwrap();
    assert_eq!(known.name, "arena");
    assert_eq!(known.creator, a_id);

    a.shutdown().await;
    b.shutdown().await;
}

#[tokio::test]
async fn test_late_joiner_catches_up_from_heads() {
    let swarm = InMemorySwarm::fully_connected();
    let clock = clock_at_round(200);
    let a = spawn_node(&swarm, 3, clock.clone(), RuntimeConfig::default());
    let channel = a.create_channel("arena", None).await.unwrap();
    for round in 101..=105 {
        a.log().commit_input(channel, round, UP).await.unwrap();
    }

    // b joins the swarm after a's chain is complete.
    let b = spawn_node(&swarm, 4, clock.clone(), RuntimeConfig::default());
    b.join_channel(channel, None).await.unwrap();

    let a_id = a.peer_id();
    assert!(eventually(|| chain_of(&b, &a_id).len() == 6).await);
    let record = b
        .log()
        .peers()
        .unwrap()
        .into_iter()
        .find(|record| record.peer_id == a_id)
        .unwrap();
    assert_eq!(record.valid_height, Some(5));
    assert_eq!(record.known_height, Some(5));

    a.shutdown().await;
    b.shutdown().await;
}
