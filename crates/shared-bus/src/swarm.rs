//! # In-Memory Swarm
//!
//! A process-local [`PeerTransport`] for sessions and tests. Nodes join a
//! shared hub; links between nodes model who can reach whom directly, so
//! partitions are a `disconnect` away. Per-subscriber queues are bounded and
//! overflow drops packets, the way a lossy network would.

use crate::transport::{PeerTransport, Topic, TransportError, TransportEvent};
use crate::DEFAULT_QUEUE_CAPACITY;
use async_trait::async_trait;
use parking_lot::Mutex;
use shared_types::PeerId;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, trace};

#[derive(Default)]
struct SwarmState {
    nodes: HashMap<PeerId, HashMap<Topic, mpsc::Sender<TransportEvent>>>,
    links: HashSet<(PeerId, PeerId)>,
}

impl SwarmState {
    fn link_key(a: PeerId, b: PeerId) -> (PeerId, PeerId) {
        if a <= b {
            (a, b)
        } else {
            (b, a)
        }
    }

    fn linked(&self, a: PeerId, b: PeerId) -> bool {
        self.links.contains(&Self::link_key(a, b))
    }

    fn neighbours(&self, peer: PeerId) -> BTreeSet<PeerId> {
        self.links
            .iter()
            .filter_map(|(a, b)| {
                if *a == peer {
                    Some(*b)
                } else if *b == peer {
                    Some(*a)
                } else {
                    None
                }
            })
            .collect()
    }

    fn sender(&self, peer: PeerId, topic: Topic) -> Option<&mpsc::Sender<TransportEvent>> {
        self.nodes.get(&peer).and_then(|topics| topics.get(&topic))
    }

    fn deliver(&self, to: PeerId, topic: Topic, event: TransportEvent) -> bool {
        let Some(sender) = self.sender(to, topic) else {
            return false;
        };
        match sender.try_send(event) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                trace!(peer = %to.short(), topic = %topic, "Subscriber queue full, dropping");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Tell both ends of a new link about each other on every shared topic.
    fn announce_link(&self, a: PeerId, b: PeerId) {
        let shared = self.shared_topics(a, b);
        for topic in shared {
            self.deliver(a, topic, TransportEvent::PeerJoined(b));
            self.deliver(b, topic, TransportEvent::PeerJoined(a));
        }
    }

    fn announce_unlink(&self, a: PeerId, b: PeerId) {
        let shared = self.shared_topics(a, b);
        for topic in shared {
            self.deliver(a, topic, TransportEvent::PeerLeft(b));
            self.deliver(b, topic, TransportEvent::PeerLeft(a));
        }
    }

    fn shared_topics(&self, a: PeerId, b: PeerId) -> Vec<Topic> {
        match (self.nodes.get(&a), self.nodes.get(&b)) {
            (Some(ta), Some(tb)) => ta.keys().filter(|t| tb.contains_key(t)).copied().collect(),
            _ => Vec::new(),
        }
    }
}

/// Hub shared by every node of a local swarm.
#[derive(Clone)]
pub struct InMemorySwarm {
    state: Arc<Mutex<SwarmState>>,
    auto_link: bool,
    queue_capacity: usize,
}

impl InMemorySwarm {
    /// A swarm where every joining node is linked to every existing node.
    pub fn fully_connected() -> Self {
        Self::with_options(true, DEFAULT_QUEUE_CAPACITY)
    }

    /// A swarm where links are created explicitly with [`connect`](Self::connect).
    pub fn manual() -> Self {
        Self::with_options(false, DEFAULT_QUEUE_CAPACITY)
    }

    pub fn with_options(auto_link: bool, queue_capacity: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(SwarmState::default())),
            auto_link,
            queue_capacity: queue_capacity.max(1),
        }
    }

    /// Register a peer and return its transport handle.
    pub fn join(&self, peer: PeerId) -> SwarmNode {
        let mut state = self.state.lock();
        if !state.nodes.contains_key(&peer) {
            state.nodes.insert(peer, HashMap::new());
            if self.auto_link {
                let others: Vec<PeerId> =
                    state.nodes.keys().filter(|p| **p != peer).copied().collect();
                for other in others {
                    state.links.insert(SwarmState::link_key(peer, other));
                }
            }
            debug!(peer = %peer.short(), "Node joined swarm");
        }
        SwarmNode {
            swarm: self.clone(),
            peer,
        }
    }

    /// Link two nodes. Returns false if they were already linked.
    pub fn connect(&self, a: PeerId, b: PeerId) -> bool {
        if a == b {
            return false;
        }
        let mut state = self.state.lock();
        if !state.links.insert(SwarmState::link_key(a, b)) {
            return false;
        }
        state.announce_link(a, b);
        true
    }

    /// Remove the link between two nodes. Returns false if there was none.
    pub fn disconnect(&self, a: PeerId, b: PeerId) -> bool {
        let mut state = self.state.lock();
        if !state.links.remove(&SwarmState::link_key(a, b)) {
            return false;
        }
        state.announce_unlink(a, b);
        true
    }

    /// Drop a node and all its links.
    pub fn remove(&self, peer: PeerId) {
        let mut state = self.state.lock();
        for other in state.neighbours(peer) {
            state.announce_unlink(peer, other);
            state.links.remove(&SwarmState::link_key(peer, other));
        }
        state.nodes.remove(&peer);
    }

    pub fn node_count(&self) -> usize {
        self.state.lock().nodes.len()
    }
}

/// One peer's view of an [`InMemorySwarm`].
#[derive(Clone)]
pub struct SwarmNode {
    swarm: InMemorySwarm,
    peer: PeerId,
}

impl SwarmNode {
    pub fn swarm(&self) -> &InMemorySwarm {
        &self.swarm
    }
}

#[async_trait]
impl PeerTransport for SwarmNode {
    fn local_peer(&self) -> PeerId {
        self.peer
    }

    async fn subscribe(
        &self,
        topic: Topic,
    ) -> Result<mpsc::Receiver<TransportEvent>, TransportError> {
        let (tx, rx) = mpsc::channel(self.swarm.queue_capacity);
        let mut state = self.swarm.state.lock();
        let topics = state.nodes.get_mut(&self.peer).ok_or(TransportError::Closed)?;
        topics.insert(topic, tx);

        for other in state.neighbours(self.peer) {
            if state.sender(other, topic).is_some() {
                state.deliver(self.peer, topic, TransportEvent::PeerJoined(other));
                state.deliver(other, topic, TransportEvent::PeerJoined(self.peer));
            }
        }
        Ok(rx)
    }

    async fn unsubscribe(&self, topic: Topic) {
        let mut state = self.swarm.state.lock();
        let removed = state
            .nodes
            .get_mut(&self.peer)
            .and_then(|topics| topics.remove(&topic))
            .is_some();
        if removed {
            for other in state.neighbours(self.peer) {
                state.deliver(other, topic, TransportEvent::PeerLeft(self.peer));
            }
        }
    }

    fn connected_peers(&self, topic: Topic) -> Vec<PeerId> {
        let state = self.swarm.state.lock();
        state
            .neighbours(self.peer)
            .into_iter()
            .filter(|p| state.sender(*p, topic).is_some())
            .collect()
    }

    async fn publish(
        &self,
        topic: Topic,
        bytes: Vec<u8>,
        ttl: u8,
    ) -> Result<usize, TransportError> {
        let state = self.swarm.state.lock();
        if state.sender(self.peer, topic).is_none() {
            return Err(TransportError::NotSubscribed(topic));
        }

        // Breadth-first relay over links, bounded by ttl hops.
        let mut visited: HashSet<PeerId> = HashSet::from([self.peer]);
        let mut frontier: VecDeque<(PeerId, u8)> = VecDeque::from([(self.peer, 0)]);
        let mut delivered = 0;
        while let Some((node, hops)) = frontier.pop_front() {
            if hops >= ttl.max(1) {
                continue;
            }
            for next in state.neighbours(node) {
                if !visited.insert(next) {
                    continue;
                }
                let event = TransportEvent::Packet {
                    from: self.peer,
                    bytes: bytes.clone(),
                };
                if state.deliver(next, topic, event) {
                    delivered += 1;
                }
                frontier.push_back((next, hops + 1));
            }
        }
        Ok(delivered)
    }

    async fn stream(
        &self,
        topic: Topic,
        bytes: Vec<u8>,
        _ttl: u8,
    ) -> Result<usize, TransportError> {
        let state = self.swarm.state.lock();
        if state.sender(self.peer, topic).is_none() {
            return Err(TransportError::NotSubscribed(topic));
        }
        let mut delivered = 0;
        for other in state.neighbours(self.peer) {
            let event = TransportEvent::Packet {
                from: self.peer,
                bytes: bytes.clone(),
            };
            if state.deliver(other, topic, event) {
                delivered += 1;
            }
        }
        Ok(delivered)
    }

    async fn send_to(
        &self,
        topic: Topic,
        peer: PeerId,
        bytes: Vec<u8>,
    ) -> Result<(), TransportError> {
        let state = self.swarm.state.lock();
        if !state.linked(self.peer, peer) || state.sender(peer, topic).is_none() {
            return Err(TransportError::PeerUnreachable(peer));
        }
        state.deliver(
            peer,
            topic,
            TransportEvent::Packet {
                from: self.peer,
                bytes,
            },
        );
        Ok(())
    }
}
