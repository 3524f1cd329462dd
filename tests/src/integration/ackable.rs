//! The acknowledgement frontier a log offers for its next commit.

use super::harness::*;
use node_runtime::RuntimeConfig;
use rc_05_simulation::domain::arena::UP;
use shared_bus::InMemorySwarm;
use shared_types::ChainBody;

#[tokio::test]
async fn test_ackable_frontier_of_one_known_peer() {
    let swarm = InMemorySwarm::manual();
    let clock = clock_at_round(50);
    let local = spawn_node(&swarm, 1, clock.clone(), RuntimeConfig::default());
    let other = spawn_node(&swarm, 2, clock.clone(), RuntimeConfig::default());

    // Zero known peers: nothing to acknowledge.
    assert!(local.log().get_ackable(None, None).unwrap().is_empty());

    let channel = other.create_channel("arena", None).await.unwrap();
    other.log().commit_input(channel, 10, UP).await.unwrap();
    other.log().commit_input(channel, 11, UP).await.unwrap();
    let chain = chain_of(&other, &other.peer_id());
    assert_eq!(chain.len(), 3);

    // Learn the peer through its two newest messages only.
    deliver(&local, &chain[1..]);
    let acks = local.log().get_ackable(None, None).unwrap();
    assert_eq!(acks, vec![chain[2].sig, chain[1].sig]);

    // An input for round 11 never acknowledges its round-11 sibling.
    let acks = local.log().get_ackable(Some(11), None).unwrap();
    assert_eq!(acks, vec![chain[1].sig]);

    // With the genesis stored as well, still at most two per peer.
    deliver(&local, &chain[..1]);
    assert_eq!(local.log().get_ackable(None, None).unwrap().len(), 2);

    // A local commit carries exactly that frontier.
    let committed = local
        .log()
        .commit(ChainBody::Input {
            round: 12,
            channel,
            data: UP,
        })
        .await
        .unwrap();
    assert_eq!(committed.acks, vec![chain[2].sig, chain[1].sig]);

    local.shutdown().await;
    other.shutdown().await;
}
