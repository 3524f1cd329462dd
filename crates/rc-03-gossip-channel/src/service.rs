//! # Gossip Service
//!
//! One service per node, one subscription per joined channel. Each joined
//! channel runs two tasks:
//!
//! - a **pump** that drains transport events, batching joins and buffering
//!   packets, and hands them on every `flush_interval` (or earlier when a
//!   buffer reaches capacity);
//! - a **status loop** that every `status_interval` diffs the connected set
//!   against the peer table and broadcasts a signed keep-alive.
//!
//! The handler (the message log) is held weakly so that the log can own
//! the gossip service without a reference cycle.

use crate::domain::{
    sign_keep_alive, verify_keep_alive, GossipConfig, GossipError, KeepAliveOutcome, PeerTable,
};
use crate::ports::{GossipApi, GossipHandler, PeerTransport};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use rc_01_wire_codec::{decode_packet, encode_packet, Packet};
use rollcast_telemetry::{
    log_peer_event, KEEPALIVES, MESSAGES_DROPPED, MESSAGES_RECEIVED, PEERS_CONNECTED,
    RPC_TIMEOUTS, SIGNATURE_FAILURES,
};
use shared_bus::{Topic, TransportEvent};
use shared_crypto::{CryptoFacade, KeyPair};
use shared_types::{
    ChannelId, KeepAlive, Message, PeerId, PeerRecord, RpcRequest, RpcResponse, TimeSource,
};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

const SUBSYSTEM: &str = "gossip";

/// The pub/sub topic for `channel`: a key only channel members can derive.
pub fn subcluster_key(crypto: &dyn CryptoFacade, channel: &ChannelId) -> Topic {
    Topic(crypto.create_shared_key(channel.signature().as_bytes()))
}

/// Keep-alive timestamps strictly increase even when two beacons share a
/// millisecond or the clock steps back.
fn next_beacon_timestamp(last: &AtomicU64, now: u64) -> u64 {
    let previous = last
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |prev| {
            Some(now.max(prev + 1))
        })
        .unwrap_or(now);
    now.max(previous + 1)
}

struct JoinedChannel {
    topic: Topic,
    tasks: Vec<JoinHandle<()>>,
}

struct Inner {
    config: GossipConfig,
    transport: Arc<dyn PeerTransport>,
    crypto: Arc<dyn CryptoFacade>,
    identity: Arc<KeyPair>,
    clock: Arc<dyn TimeSource>,
    local: PeerId,
    handler: RwLock<Option<Weak<dyn GossipHandler>>>,
    channels: Mutex<HashMap<ChannelId, JoinedChannel>>,
    peers: Mutex<PeerTable>,
    pending: Mutex<HashMap<u64, oneshot::Sender<RpcResponse>>>,
    next_request: AtomicU64,
    last_keep_alive: AtomicU64,
    shutdown: watch::Sender<bool>,
}

/// Cheaply cloneable handle to a node's gossip layer.
#[derive(Clone)]
pub struct GossipService {
    inner: Arc<Inner>,
}

impl GossipService {
    pub fn new(
        config: GossipConfig,
        transport: Arc<dyn PeerTransport>,
        crypto: Arc<dyn CryptoFacade>,
        identity: Arc<KeyPair>,
        clock: Arc<dyn TimeSource>,
    ) -> Self {
        let local = PeerId::new(identity.public_key());
        let id_seed = crypto.create_id();
        let mut first = [0u8; 8];
        first.copy_from_slice(&id_seed[..8]);
        let (shutdown, _) = watch::channel(false);

        Self {
            inner: Arc::new(Inner {
                config,
                transport,
                crypto,
                identity,
                clock,
                local,
                handler: RwLock::new(None),
                channels: Mutex::new(HashMap::new()),
                peers: Mutex::new(PeerTable::new()),
                pending: Mutex::new(HashMap::new()),
                next_request: AtomicU64::new(u64::from_le_bytes(first)),
                last_keep_alive: AtomicU64::new(0),
                shutdown,
            }),
        }
    }

    /// Route inbound traffic to `handler`. Traffic that arrives while no
    /// live handler is set is dropped.
    pub fn set_handler(&self, handler: Weak<dyn GossipHandler>) {
        *self.inner.handler.write() = Some(handler);
    }

    pub fn config(&self) -> &GossipConfig {
        &self.inner.config
    }

    pub fn topic(&self, channel: &ChannelId) -> Topic {
        subcluster_key(self.inner.crypto.as_ref(), channel)
    }

    /// Liveness record for `peer`, if it has been heard from.
    pub fn peer(&self, peer: &PeerId) -> Option<PeerRecord> {
        self.inner.peers.lock().get(peer).cloned()
    }

    /// Sign and broadcast a keep-alive on `channel` now.
    pub async fn send_keep_alive(&self, channel: &ChannelId) -> Result<usize, GossipError> {
        self.inner.send_keep_alive(channel).await
    }

    /// Run one status pass on `channel` outside the regular schedule.
    pub async fn refresh_status(&self, channel: &ChannelId) -> Result<(), GossipError> {
        self.inner.status_tick(channel).await
    }
}

#[async_trait]
impl GossipApi for GossipService {
    fn local_peer(&self) -> PeerId {
        self.inner.local
    }

    async fn join(&self, channel: ChannelId) -> Result<(), GossipError> {
        let inner = &self.inner;
        if *inner.shutdown.borrow() {
            return Err(GossipError::Shutdown);
        }
        let topic = self.topic(&channel);
        {
            let mut channels = inner.channels.lock();
            if channels.contains_key(&channel) {
                return Ok(());
            }
            channels.insert(
                channel,
                JoinedChannel {
                    topic,
                    tasks: Vec::new(),
                },
            );
        }

        let events = match inner.transport.subscribe(topic).await {
            Ok(events) => events,
            Err(e) => {
                inner.channels.lock().remove(&channel);
                return Err(e.into());
            }
        };

        let pump = tokio::spawn(
            inner
                .clone()
                .pump(channel, events, inner.shutdown.subscribe()),
        );
        let status = tokio::spawn(
            inner
                .clone()
                .status_loop(channel, inner.shutdown.subscribe()),
        );

        let mut channels = inner.channels.lock();
        match channels.get_mut(&channel) {
            Some(joined) => joined.tasks.extend([pump, status]),
            None => {
                // Left while subscribing.
                pump.abort();
                status.abort();
            }
        }
        info!(subsystem = SUBSYSTEM, channel = %channel, topic = %topic, "Joined channel");
        Ok(())
    }

    async fn leave(&self, channel: &ChannelId) {
        let inner = &self.inner;
        let joined = inner.channels.lock().remove(channel);
        let Some(joined) = joined else {
            return;
        };
        for task in joined.tasks {
            task.abort();
        }
        inner.transport.unsubscribe(joined.topic).await;

        let (lost, count) = {
            let mut peers = inner.peers.lock();
            (peers.leave_channel(channel), peers.connected_count())
        };
        PEERS_CONNECTED.set(count as f64);
        if let Some(handler) = inner.handler() {
            for record in lost {
                handler.on_peer_update(*channel, record).await;
            }
        }
        info!(subsystem = SUBSYSTEM, channel = %channel, "Left channel");
    }

    async fn emit(
        &self,
        channel: &ChannelId,
        messages: Vec<Message>,
        ttl: u8,
    ) -> Result<usize, GossipError> {
        self.inner.emit(channel, messages, ttl).await
    }

    async fn request(
        &self,
        channel: &ChannelId,
        peer: PeerId,
        request: RpcRequest,
    ) -> RpcResponse {
        self.inner.request(channel, peer, request).await
    }

    fn connected_peers(&self, channel: &ChannelId) -> Vec<PeerId> {
        self.inner.peers.lock().connected(channel)
    }

    fn joined_channels(&self) -> Vec<ChannelId> {
        self.inner.channels.lock().keys().copied().collect()
    }

    async fn shutdown(&self) {
        self.inner.shutdown.send_replace(true);
        for channel in self.joined_channels() {
            self.leave(&channel).await;
        }
        self.inner.peers.lock().clear();
        // Dropping the senders resolves outstanding requests as empty.
        self.inner.pending.lock().clear();
        PEERS_CONNECTED.set(0.0);
        info!(subsystem = SUBSYSTEM, "Gossip service shut down");
    }
}

impl Inner {
    fn handler(&self) -> Option<Arc<dyn GossipHandler>> {
        self.handler.read().as_ref().and_then(Weak::upgrade)
    }

    fn topic_of(&self, channel: &ChannelId) -> Result<Topic, GossipError> {
        self.channels
            .lock()
            .get(channel)
            .map(|joined| joined.topic)
            .ok_or(GossipError::NotJoined(*channel))
    }

    async fn emit(
        &self,
        channel: &ChannelId,
        messages: Vec<Message>,
        ttl: u8,
    ) -> Result<usize, GossipError> {
        let topic = self.topic_of(channel)?;
        let bytes = encode_packet(&Packet::Batch(messages))?;
        let sent = if self.transport.connected_peers(topic).is_empty() {
            self.transport.publish(topic, bytes, ttl).await?
        } else {
            self.transport.stream(topic, bytes, ttl).await?
        };
        Ok(sent)
    }

    async fn request(&self, channel: &ChannelId, peer: PeerId, request: RpcRequest) -> RpcResponse {
        let Ok(topic) = self.topic_of(channel) else {
            return RpcResponse::empty();
        };
        let id = self.next_request.fetch_add(1, Ordering::Relaxed);
        let bytes = match encode_packet(&Packet::Request { id, request }) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(subsystem = SUBSYSTEM, error = %e, "Failed to encode request");
                return RpcResponse::empty();
            }
        };

        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, tx);

        if let Err(e) = self.transport.send_to(topic, peer, bytes).await {
            self.pending.lock().remove(&id);
            log_peer_event!(warn, SUBSYSTEM, "Request send failed", peer.short(), error = %e);
            return RpcResponse::empty();
        }

        match tokio::time::timeout(self.config.rpc_timeout(), rx).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => RpcResponse::empty(),
            Err(_) => {
                self.pending.lock().remove(&id);
                RPC_TIMEOUTS.inc();
                log_peer_event!(debug, SUBSYSTEM, "Request timed out", peer.short(), id = id);
                RpcResponse::empty()
            }
        }
    }

    async fn send_keep_alive(&self, channel: &ChannelId) -> Result<usize, GossipError> {
        let timestamp = next_beacon_timestamp(&self.last_keep_alive, self.clock.now_ms());

        let sees = self.peers.lock().connected(channel);
        let keep_alive = sign_keep_alive(
            self.crypto.as_ref(),
            &self.identity,
            timestamp,
            sees,
            self.config.display_name.clone(),
        )?;
        self.emit(
            channel,
            vec![Message::KeepAlive(keep_alive)],
            self.config.default_ttl,
        )
        .await
    }

    async fn status_tick(&self, channel: &ChannelId) -> Result<(), GossipError> {
        self.sync_peers(channel).await?;
        self.send_keep_alive(channel).await?;
        Ok(())
    }

    /// Diff the transport's connected set against the table and forward
    /// the changed records.
    async fn sync_peers(&self, channel: &ChannelId) -> Result<(), GossipError> {
        let topic = self.topic_of(channel)?;
        let connected = self.transport.connected_peers(topic);
        let now = self.clock.now_ms();
        let (changed, count) = {
            let mut peers = self.peers.lock();
            let changed = peers.sync_connected(channel, &connected, now);
            (changed, peers.connected_count())
        };
        PEERS_CONNECTED.set(count as f64);

        if changed.is_empty() {
            return Ok(());
        }
        debug!(
            subsystem = SUBSYSTEM,
            channel = %channel,
            changed = changed.len(),
            connected = connected.len(),
            "Peer set changed"
        );
        if let Some(handler) = self.handler() {
            for record in changed {
                handler.on_peer_update(*channel, record).await;
            }
        }
        Ok(())
    }

    async fn status_loop(self: Arc<Self>, channel: ChannelId, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.status_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.status_tick(&channel).await {
                        warn!(subsystem = SUBSYSTEM, channel = %channel, error = %e, "Status tick failed");
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
        debug!(subsystem = SUBSYSTEM, channel = %channel, "Status loop stopped");
    }

    async fn pump(
        self: Arc<Self>,
        channel: ChannelId,
        mut events: mpsc::Receiver<TransportEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut joins: Vec<PeerId> = Vec::new();
        let mut packets: VecDeque<(PeerId, Vec<u8>)> = VecDeque::new();
        let mut flush = tokio::time::interval(self.config.flush_interval());
        flush.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                event = events.recv() => {
                    let Some(event) = event else { break };
                    match event {
                        TransportEvent::PeerJoined(peer) => {
                            joins.push(peer);
                            if joins.len() >= self.config.join_batch_capacity {
                                self.flush_joins(&channel, &mut joins).await;
                            }
                        }
                        TransportEvent::PeerLeft(peer) => {
                            joins.retain(|p| *p != peer);
                            log_peer_event!(debug, SUBSYSTEM, "Peer left topic", peer.short());
                        }
                        TransportEvent::Packet { from, bytes } => {
                            packets.push_back((from, bytes));
                            if packets.len() >= self.config.packet_buffer_capacity {
                                self.flush_packets(&channel, &mut packets).await;
                            }
                        }
                    }
                }
                _ = flush.tick() => {
                    self.flush_joins(&channel, &mut joins).await;
                    self.flush_packets(&channel, &mut packets).await;
                }
                _ = shutdown.changed() => break,
            }
        }
        debug!(subsystem = SUBSYSTEM, channel = %channel, "Event pump stopped");
    }

    async fn flush_joins(&self, channel: &ChannelId, joins: &mut Vec<PeerId>) {
        if joins.is_empty() {
            return;
        }
        let mut batch = std::mem::take(joins);
        batch.sort();
        batch.dedup();

        if let Err(e) = self.sync_peers(channel).await {
            debug!(subsystem = SUBSYSTEM, channel = %channel, error = %e, "Join flush skipped");
            return;
        }
        if let Some(handler) = self.handler() {
            handler.on_peers_joined(*channel, batch).await;
        }
    }

    async fn flush_packets(&self, channel: &ChannelId, packets: &mut VecDeque<(PeerId, Vec<u8>)>) {
        while let Some((from, bytes)) = packets.pop_front() {
            self.handle_packet(channel, from, &bytes).await;
        }
    }

    async fn handle_packet(&self, channel: &ChannelId, from: PeerId, bytes: &[u8]) {
        let packet = match decode_packet(bytes) {
            Ok(packet) => packet,
            Err(e) => {
                MESSAGES_DROPPED.with_label_values(&["malformed"]).inc();
                log_peer_event!(warn, SUBSYSTEM, "Dropping malformed packet", from.short(), error = %e);
                return;
            }
        };

        let first_contact = self.peers.lock().touch(channel, from, self.clock.now_ms());
        let handler = self.handler();
        if let (Some(record), Some(handler)) = (first_contact, handler.as_ref()) {
            handler.on_peer_update(*channel, record).await;
        }

        match packet {
            Packet::Batch(messages) => {
                for message in messages {
                    MESSAGES_RECEIVED.with_label_values(&[message.kind()]).inc();
                    match message {
                        Message::KeepAlive(keep_alive) => {
                            self.handle_keep_alive(channel, keep_alive).await;
                        }
                        other => match handler.as_ref() {
                            Some(handler) => handler.on_message(*channel, from, other).await,
                            None => {
                                MESSAGES_DROPPED.with_label_values(&["no_handler"]).inc();
                            }
                        },
                    }
                }
            }
            Packet::Request { id, request } => {
                let response = match handler.as_ref() {
                    Some(handler) => handler.on_request(*channel, from, request).await,
                    None => RpcResponse::empty(),
                };
                self.respond(channel, from, id, response).await;
            }
            Packet::Response { id, response } => {
                let waiter = self.pending.lock().remove(&id);
                match waiter {
                    Some(waiter) => {
                        let _ = waiter.send(response);
                    }
                    None => {
                        log_peer_event!(debug, SUBSYSTEM, "Late or unknown response", from.short(), id = id);
                    }
                }
            }
        }
    }

    async fn respond(&self, channel: &ChannelId, to: PeerId, id: u64, response: RpcResponse) {
        let Ok(topic) = self.topic_of(channel) else {
            return;
        };
        let bytes = match encode_packet(&Packet::Response { id, response }) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(subsystem = SUBSYSTEM, error = %e, "Failed to encode response");
                return;
            }
        };
        if let Err(e) = self.transport.send_to(topic, to, bytes).await {
            log_peer_event!(warn, SUBSYSTEM, "Response send failed", to.short(), error = %e);
        }
    }

    async fn handle_keep_alive(&self, channel: &ChannelId, keep_alive: KeepAlive) {
        if keep_alive.peer == self.local {
            return;
        }
        if !verify_keep_alive(self.crypto.as_ref(), &keep_alive) {
            SIGNATURE_FAILURES.inc();
            KEEPALIVES.with_label_values(&["bad_signature"]).inc();
            log_peer_event!(warn, SUBSYSTEM, "Keep-alive signature invalid", keep_alive.peer.short());
            return;
        }

        let outcome =
            self.peers
                .lock()
                .accept_keep_alive(channel, &keep_alive, self.clock.now_ms());
        match outcome {
            KeepAliveOutcome::Accepted(record) => {
                KEEPALIVES.with_label_values(&["accepted"]).inc();
                if let Some(handler) = self.handler() {
                    handler.on_peer_update(*channel, record).await;
                }
            }
            KeepAliveOutcome::Stale => {
                KEEPALIVES.with_label_values(&["stale"]).inc();
                log_peer_event!(
                    debug,
                    SUBSYSTEM,
                    "Stale keep-alive",
                    keep_alive.peer.short(),
                    timestamp = keep_alive.timestamp
                );
            }
        }
    }
}
