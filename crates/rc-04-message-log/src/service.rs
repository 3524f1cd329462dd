//! # Message Log Service
//!
//! Owns the local identity and chain cursor, signs and stores what the local
//! peer commits, and verifies, deduplicates, stores and dispatches what
//! arrives from the gossip layer.
//!
//! ## Commit Flow
//!
//! ```text
//! commit(body)
//!   ├─ gate (second caller gets LogError::Busy)
//!   ├─ cursor: height/parent, loaded once from the store
//!   ├─ ackable set (2 newest per known peer, filtered)
//!   ├─ sign canonical hash ─► store (one transaction) ─► events
//!   └─ broadcast [parent, message] to every joined channel
//! ```
//!
//! ## Receive Flow
//!
//! ```text
//! receive(from, msg)
//!   ├─ own message? ─► ignore
//!   ├─ in processed/acked cache? ─► drop (duplicate)
//!   ├─ signature invalid? ─► drop + warn
//!   ├─ store (idempotent) + channel upserts + peer heights
//!   └─ parent missing? ─► spawn gap request valid+1 ..= height-1
//! ```

use crate::domain::{
    select_ackable, sign_chain_message, verify_chain_message, AckFilter, LogConfig, LogError,
    LogEvent,
};
use crate::ports::{GossipApi, InputObserver};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use rc_02_message_store::{MessageStore, StoreError, StoreTxn};
use rc_03_gossip_channel::GossipHandler;
use rollcast_telemetry::{
    log_peer_event, GAP_REQUESTS, MESSAGES_COMMITTED, MESSAGES_DROPPED, SIGNATURE_FAILURES,
};
use shared_crypto::{CryptoFacade, KeyPair};
use shared_types::{
    ChainBody, ChainMessage, Channel, ChannelId, Chat, ExclusiveGate, InputBits, LruCache,
    Message, PeerId, PeerRecord, Round, RpcRequest, RpcResponse, Signature, StoredMessage,
    TimeSource, UnsignedChainMessage,
};
use std::collections::HashSet;
use std::sync::{Arc, Weak};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

const SUBSYSTEM: &str = "message_log";

/// What happened to a received chain message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Received {
    /// Newly stored with this `arrived` stamp.
    Stored { arrived: u64 },
    /// Verified but already in the store.
    AlreadyStored,
    /// Seen recently; dropped before verification.
    Duplicate,
    /// Authored by the local peer.
    OwnMessage,
    BadSignature,
}

#[derive(Debug, Clone, Copy)]
struct ChainCursor {
    next_height: u64,
    parent: Option<Signature>,
}

/// One peer's append-only chain plus everything it has learned from others.
pub struct MessageLog {
    config: LogConfig,
    identity: Arc<KeyPair>,
    local: PeerId,
    crypto: Arc<dyn CryptoFacade>,
    store: Arc<MessageStore>,
    gossip: Arc<dyn GossipApi>,
    clock: Arc<dyn TimeSource>,
    observer: RwLock<Option<Arc<dyn InputObserver>>>,
    commit_gate: ExclusiveGate,
    cursor: Mutex<Option<ChainCursor>>,
    processed: LruCache<Signature, ()>,
    acked: LruCache<Signature, ()>,
    gap_fills: Mutex<HashSet<PeerId>>,
    events: broadcast::Sender<LogEvent>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    shutdown: watch::Sender<bool>,
    this: Weak<MessageLog>,
}

impl MessageLog {
    pub fn new(
        config: LogConfig,
        identity: Arc<KeyPair>,
        crypto: Arc<dyn CryptoFacade>,
        store: Arc<MessageStore>,
        gossip: Arc<dyn GossipApi>,
        clock: Arc<dyn TimeSource>,
    ) -> Arc<Self> {
        let local = PeerId::new(identity.public_key());
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let (shutdown, _) = watch::channel(false);
        Arc::new_cyclic(|this| Self {
            processed: LruCache::new(config.dedup_capacity, config.dedup_ttl()),
            acked: LruCache::new(config.dedup_capacity, config.dedup_ttl()),
            config,
            identity,
            local,
            crypto,
            store,
            gossip,
            clock,
            observer: RwLock::new(None),
            commit_gate: ExclusiveGate::new(),
            cursor: Mutex::new(None),
            gap_fills: Mutex::new(HashSet::new()),
            events,
            tasks: Mutex::new(Vec::new()),
            shutdown,
            this: this.clone(),
        })
    }

    pub fn local_peer(&self) -> PeerId {
        self.local
    }

    pub fn store(&self) -> &Arc<MessageStore> {
        &self.store
    }

    pub fn set_input_observer(&self, observer: Arc<dyn InputObserver>) {
        *self.observer.write() = Some(observer);
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<LogEvent> {
        self.events.subscribe()
    }

    // -------------------------------------------------------------------------
    // Commit
    // -------------------------------------------------------------------------

    /// Sign, store and broadcast the next message of the local chain.
    pub async fn commit(&self, body: ChainBody) -> Result<ChainMessage, LogError> {
        let _permit = self.commit_gate.try_enter().ok_or(LogError::Busy)?;

        let cursor = self.cursor()?;
        let filter = AckFilter {
            round: body.input_round(),
            channel: body.channel().copied(),
        };
        let acks = self.ackable(&filter)?;
        let unsigned = UnsignedChainMessage {
            body,
            peer: self.local,
            parent: cursor.parent,
            height: cursor.next_height,
            acks,
        };
        let message = sign_chain_message(self.crypto.as_ref(), &self.identity, unsigned)?;

        let events = self.store.transaction(|txn| -> Result<_, LogError> {
            txn.put_message(&message)?;
            Ok(self.index_message(txn, &message)?)
        })?;

        *self.cursor.lock() = Some(ChainCursor {
            next_height: message.height + 1,
            parent: Some(message.sig),
        });
        for ack in &message.acks {
            self.acked.insert(*ack, ());
        }
        self.processed.insert(message.sig, ());
        MESSAGES_COMMITTED
            .with_label_values(&[message.body.kind()])
            .inc();
        debug!(
            subsystem = SUBSYSTEM,
            kind = message.body.kind(),
            height = message.height,
            acks = message.acks.len(),
            "Committed message"
        );

        self.publish(events);
        self.broadcast_committed(&message).await;
        Ok(message)
    }

    /// Found a channel and join its gossip group.
    pub async fn create_channel(&self, name: impl Into<String>) -> Result<ChannelId, LogError> {
        let genesis = self
            .commit(ChainBody::CreateChannel { name: name.into() })
            .await?;
        let channel = ChannelId::from_genesis(genesis.sig);
        info!(subsystem = SUBSYSTEM, channel = %channel, "Created channel");
        self.join_channel(channel).await?;
        Ok(channel)
    }

    /// Replace the accepted peer set of a known channel.
    pub async fn set_peers(
        &self,
        channel: ChannelId,
        peers: Vec<PeerId>,
    ) -> Result<ChainMessage, LogError> {
        if self.store.get_channel(&channel)?.is_none() {
            return Err(LogError::UnknownChannel(channel));
        }
        let mut peers = peers;
        peers.sort();
        peers.dedup();
        self.commit(ChainBody::SetPeers { channel, peers }).await
    }

    pub async fn commit_input(
        &self,
        channel: ChannelId,
        round: Round,
        data: InputBits,
    ) -> Result<ChainMessage, LogError> {
        self.commit(ChainBody::Input {
            round,
            channel,
            data,
        })
        .await
    }

    /// Send a chat line to a joined channel. Chat is never stored.
    pub async fn chat(&self, channel: &ChannelId, text: impl Into<String>) -> Result<(), LogError> {
        let id_bytes = self.crypto.create_id();
        let mut id = [0u8; 8];
        id.copy_from_slice(&id_bytes[..8]);
        let chat = Chat {
            id: u64::from_le_bytes(id),
            text: text.into(),
        };
        self.gossip
            .emit(channel, vec![Message::Chat(chat)], self.config.broadcast_ttl)
            .await?;
        Ok(())
    }

    /// Signatures a message committed now would acknowledge.
    pub fn get_ackable(
        &self,
        round: Option<Round>,
        channel: Option<ChannelId>,
    ) -> Result<Vec<Signature>, LogError> {
        self.ackable(&AckFilter { round, channel })
    }

    pub fn verify(&self, message: &ChainMessage) -> bool {
        verify_chain_message(self.crypto.as_ref(), message)
    }

    fn cursor(&self) -> Result<ChainCursor, LogError> {
        if let Some(cursor) = *self.cursor.lock() {
            return Ok(cursor);
        }
        let cursor = match self.store.last_by_peer(&self.local)? {
            Some(last) => ChainCursor {
                next_height: last.message.height + 1,
                parent: Some(last.message.sig),
            },
            None => ChainCursor {
                next_height: 0,
                parent: None,
            },
        };
        *self.cursor.lock() = Some(cursor);
        Ok(cursor)
    }

    fn ackable(&self, filter: &AckFilter) -> Result<Vec<Signature>, LogError> {
        let per_peer = self.config.ackable_per_peer;
        let recent = self
            .store
            .transaction(|txn| -> Result<Vec<Vec<StoredMessage>>, StoreError> {
                let mut recent = Vec::new();
                for record in txn.peers()? {
                    if record.peer_id == self.local {
                        continue;
                    }
                    recent.push(txn.recent_by_peer(&record.peer_id, per_peer)?);
                }
                Ok(recent)
            })?;
        Ok(select_ackable(
            recent.iter().map(Vec::as_slice),
            filter,
            per_peer,
        ))
    }

    async fn broadcast_committed(&self, message: &ChainMessage) {
        let mut batch = Vec::with_capacity(2);
        if let Some(parent) = &message.parent {
            match self.store.get_message(parent) {
                Ok(Some(stored)) => batch.push(Message::Chain(stored.message)),
                Ok(None) => {}
                Err(e) => warn!(subsystem = SUBSYSTEM, error = %e, "Parent lookup failed"),
            }
        }
        batch.push(Message::Chain(message.clone()));

        for channel in self.gossip.joined_channels() {
            if let Err(e) = self
                .gossip
                .emit(&channel, batch.clone(), self.config.broadcast_ttl)
                .await
            {
                warn!(subsystem = SUBSYSTEM, channel = %channel, error = %e, "Broadcast failed");
            }
        }
    }

    // -------------------------------------------------------------------------
    // Receive
    // -------------------------------------------------------------------------

    /// Verify, store and dispatch a chain message received from `from`.
    pub fn receive(&self, from: PeerId, message: ChainMessage) -> Result<Received, LogError> {
        if message.peer == self.local {
            return Ok(Received::OwnMessage);
        }
        if self.processed.contains(&message.sig) || self.acked.contains(&message.sig) {
            MESSAGES_DROPPED.with_label_values(&["duplicate"]).inc();
            return Ok(Received::Duplicate);
        }
        if !self.verify(&message) {
            SIGNATURE_FAILURES.inc();
            MESSAGES_DROPPED.with_label_values(&["bad_signature"]).inc();
            log_peer_event!(
                warn,
                SUBSYSTEM,
                "Dropping message with invalid signature",
                message.peer.short(),
                from = %from.short(),
                height = message.height
            );
            return Ok(Received::BadSignature);
        }
        let now = self.clock.now_ms();
        let outcome = self.store.transaction(|txn| -> Result<_, StoreError> {
            let Some(arrived) = txn.put_message(&message)? else {
                return Ok(None);
            };
            let mut events = self.index_message(txn, &message)?;
            let (record, gap) = Self::track_heights(txn, &message, now)?;
            events.push(LogEvent::PeersChanged(record));
            Ok(Some((arrived, events, gap)))
        })?;
        // Only once stored: a failed write must stay open to redelivery.
        self.processed.insert(message.sig, ());

        let Some((arrived, events, gap)) = outcome else {
            return Ok(Received::AlreadyStored);
        };
        self.publish(events);
        if let Some((from_height, to_height)) = gap {
            self.spawn_gap_fill(message.channel(), from, message.peer, from_height, to_height);
        }
        Ok(Received::Stored { arrived })
    }

    /// Merge a liveness update from the gossip layer into the stored record.
    /// Heights stay as tracked by `receive`; the name is set once.
    pub fn update_peer(
        &self,
        channel: ChannelId,
        update: PeerRecord,
    ) -> Result<Option<PeerRecord>, LogError> {
        if update.peer_id == self.local {
            return Ok(None);
        }
        let merged = self.store.transaction(|txn| -> Result<_, StoreError> {
            let mut stored = txn
                .get_peer(&update.peer_id)?
                .unwrap_or_else(|| PeerRecord::new(update.peer_id));
            if stored.name.is_none() {
                stored.name = update.name.clone();
            }
            stored.last_seen = stored.last_seen.max(update.last_seen);
            stored.last_keep_alive = stored.last_keep_alive.max(update.last_keep_alive);
            stored.connected = update.connected;
            stored.proxy = update.proxy;
            stored.sees = update.sees.clone();
            for joined in &update.channels {
                stored.add_channel(*joined);
            }
            stored.add_channel(channel);
            txn.put_peer(&stored)?;
            Ok(stored)
        })?;
        self.publish(vec![LogEvent::PeersChanged(merged.clone())]);
        Ok(Some(merged))
    }

    /// Serve a direct request from another peer.
    pub fn answer_request(&self, from: PeerId, request: RpcRequest) -> RpcResponse {
        match request {
            RpcRequest::MessagesByHeight {
                peer,
                from_height,
                to_height,
            } => {
                if to_height < from_height {
                    return RpcResponse::empty();
                }
                let capped = to_height.min(
                    from_height.saturating_add(self.config.max_response_messages.max(1) - 1),
                );
                match self.store.messages_by_peer(&peer, from_height, capped) {
                    Ok(messages) => {
                        log_peer_event!(
                            debug,
                            SUBSYSTEM,
                            "Answering height request",
                            from.short(),
                            author = %peer.short(),
                            count = messages.len()
                        );
                        RpcResponse::Messages(messages)
                    }
                    Err(e) => {
                        warn!(subsystem = SUBSYSTEM, error = %e, "Height request failed");
                        RpcResponse::empty()
                    }
                }
            }
        }
    }

    // Channel records and input notifications for a freshly stored message.
    fn index_message(
        &self,
        txn: &mut StoreTxn<'_>,
        message: &ChainMessage,
    ) -> Result<Vec<LogEvent>, StoreError> {
        match &message.body {
            ChainBody::CreateChannel { name } => {
                let id = message.channel();
                let channel = match txn.get_channel(&id)? {
                    Some(mut existing) => {
                        if !existing.name.is_empty() && existing.name != *name {
                            warn!(
                                subsystem = SUBSYSTEM,
                                channel = %id,
                                old = %existing.name,
                                new = %name,
                                "Channel name overwritten (last writer wins)"
                            );
                        }
                        existing.name = name.clone();
                        existing.creator = message.peer;
                        existing
                    }
                    None => Channel {
                        id,
                        name: name.clone(),
                        creator: message.peer,
                        peers: Vec::new(),
                    },
                };
                txn.put_channel(&channel)?;
                Ok(vec![LogEvent::ChannelUpdated(channel)])
            }
            ChainBody::SetPeers { channel, peers } => {
                // May arrive before the genesis; the name is filled in later.
                let mut record = txn.get_channel(channel)?.unwrap_or_else(|| Channel {
                    id: *channel,
                    name: String::new(),
                    creator: message.peer,
                    peers: Vec::new(),
                });
                record.peers = peers.clone();
                txn.put_channel(&record)?;
                Ok(vec![LogEvent::ChannelUpdated(record)])
            }
            ChainBody::Input { round, channel, .. } => Ok(vec![LogEvent::InputStored {
                channel: *channel,
                round: *round,
                peer: message.peer,
                sig: message.sig,
            }]),
        }
    }

    // Update known/valid heights of the author; returns the record and the
    // height range to request when the parent is missing.
    fn track_heights(
        txn: &mut StoreTxn<'_>,
        message: &ChainMessage,
        now: u64,
    ) -> Result<(PeerRecord, Option<(u64, u64)>), StoreError> {
        let mut record = txn
            .get_peer(&message.peer)?
            .unwrap_or_else(|| PeerRecord::new(message.peer));
        record.add_channel(message.channel());
        record.last_seen = record.last_seen.max(now);
        record.known_height = Some(
            record
                .known_height
                .map_or(message.height, |h| h.max(message.height)),
        );
        record.valid_height = txn.contiguous_height(&message.peer, record.valid_height)?;
        txn.put_peer(&record)?;

        let gap = match &message.parent {
            Some(parent) if !txn.has_message(parent)? => {
                let from = record.valid_height.map_or(0, |h| h + 1);
                (from < message.height).then(|| (from, message.height - 1))
            }
            _ => None,
        };
        Ok((record, gap))
    }

    fn publish(&self, events: Vec<LogEvent>) {
        let observer = self.observer.read().clone();
        for event in events {
            if let (
                Some(observer),
                LogEvent::InputStored {
                    channel,
                    round,
                    peer,
                    ..
                },
            ) = (&observer, &event)
            {
                observer.on_input(channel, *round, peer);
            }
            // No subscribers is fine.
            let _ = self.events.send(event);
        }
    }

    fn spawn_gap_fill(
        &self,
        channel: ChannelId,
        from: PeerId,
        author: PeerId,
        from_height: u64,
        to_height: u64,
    ) {
        if !self.gap_fills.lock().insert(author) {
            return;
        }
        let Some(this) = self.this.upgrade() else {
            return;
        };
        GAP_REQUESTS.inc();
        log_peer_event!(
            debug,
            SUBSYSTEM,
            "Requesting missing heights",
            author.short(),
            from = %from.short(),
            from_height = from_height,
            to_height = to_height
        );
        tokio::spawn(this.fill_gap(channel, from, author, from_height, to_height));
    }

    async fn fill_gap(
        self: Arc<Self>,
        channel: ChannelId,
        from: PeerId,
        author: PeerId,
        from_height: u64,
        to_height: u64,
    ) {
        let response = self
            .gossip
            .request(
                &channel,
                from,
                RpcRequest::MessagesByHeight {
                    peer: author,
                    from_height,
                    to_height,
                },
            )
            .await;
        self.gap_fills.lock().remove(&author);

        let RpcResponse::Messages(messages) = response;
        for message in messages {
            if message.peer != author {
                continue;
            }
            if let Err(e) = self.receive(from, message) {
                error!(subsystem = SUBSYSTEM, error = %e, "Storing gap response failed");
            }
        }
    }

    // -------------------------------------------------------------------------
    // Channels and heads
    // -------------------------------------------------------------------------

    pub async fn join_channel(&self, channel: ChannelId) -> Result<(), LogError> {
        self.gossip.join(channel).await?;
        self.broadcast_heads(&channel).await;
        Ok(())
    }

    /// Re-send the local head and the heads of the channel's peers.
    pub async fn broadcast_heads(&self, channel: &ChannelId) {
        let heads = self.store.transaction(|txn| -> Result<_, StoreError> {
            let mut heads = Vec::new();
            if let Some(own) = txn.last_by_peer(&self.local)? {
                heads.push(Message::Chain(own.message));
            }
            for record in txn.peers()? {
                if record.peer_id == self.local || !record.channels.contains(channel) {
                    continue;
                }
                if let Some(head) = txn.last_by_peer(&record.peer_id)? {
                    heads.push(Message::Chain(head.message));
                }
            }
            Ok(heads)
        });
        let heads = match heads {
            Ok(heads) if !heads.is_empty() => heads,
            Ok(_) => return,
            Err(e) => {
                warn!(subsystem = SUBSYSTEM, error = %e, "Head lookup failed");
                return;
            }
        };
        if let Err(e) = self
            .gossip
            .emit(channel, heads, self.config.broadcast_ttl)
            .await
        {
            debug!(subsystem = SUBSYSTEM, channel = %channel, error = %e, "Head broadcast failed");
        }
    }

    pub async fn broadcast_all_heads(&self) {
        for channel in self.gossip.joined_channels() {
            self.broadcast_heads(&channel).await;
        }
    }

    /// Start the periodic head re-broadcast.
    pub fn start(&self) {
        let this = self.this.clone();
        let interval = self.config.head_rebroadcast_interval();
        let mut shutdown = self.shutdown.subscribe();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let Some(log) = this.upgrade() else { break };
                        log.broadcast_all_heads().await;
                    }
                    _ = shutdown.changed() => break,
                }
            }
        });
        self.tasks.lock().push(handle);
    }

    // -------------------------------------------------------------------------
    // Queries and lifecycle
    // -------------------------------------------------------------------------

    pub fn peers(&self) -> Result<Vec<PeerRecord>, LogError> {
        Ok(self.store.peers()?)
    }

    pub fn channels(&self) -> Result<Vec<Channel>, LogError> {
        Ok(self.store.channels()?)
    }

    pub fn channel(&self, id: &ChannelId) -> Result<Option<Channel>, LogError> {
        Ok(self.store.get_channel(id)?)
    }

    /// Destructive: wipe the store and forget the chain cursor.
    pub fn reset(&self) -> Result<(), LogError> {
        self.store.reset()?;
        *self.cursor.lock() = None;
        self.processed.clear();
        self.acked.clear();
        self.gap_fills.lock().clear();
        warn!(subsystem = SUBSYSTEM, "Message log reset");
        Ok(())
    }

    /// Stop loops, leave the gossip layer and clear session liveness.
    pub async fn shutdown(&self) {
        self.shutdown.send_replace(true);
        let tasks: Vec<JoinHandle<()>> = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            task.abort();
        }
        self.gossip.shutdown().await;
        if let Err(e) = self.store.clear_peers() {
            warn!(subsystem = SUBSYSTEM, error = %e, "Clearing peers failed");
        }
        info!(subsystem = SUBSYSTEM, "Message log shut down");
    }
}

#[async_trait]
impl GossipHandler for MessageLog {
    async fn on_message(&self, channel: ChannelId, from: PeerId, message: Message) {
        match message {
            Message::Chain(chain) => {
                if let Err(e) = self.receive(from, chain) {
                    error!(subsystem = SUBSYSTEM, channel = %channel, error = %e, "Receive failed");
                }
            }
            Message::Chat(chat) => {
                let _ = self.events.send(LogEvent::Chat {
                    channel,
                    from,
                    chat,
                });
            }
            // Consumed by the gossip layer.
            Message::KeepAlive(_) => {}
        }
    }

    async fn on_peer_update(&self, channel: ChannelId, record: PeerRecord) {
        if let Err(e) = self.update_peer(channel, record) {
            warn!(subsystem = SUBSYSTEM, channel = %channel, error = %e, "Peer update failed");
        }
    }

    async fn on_peers_joined(&self, channel: ChannelId, peers: Vec<PeerId>) {
        debug!(subsystem = SUBSYSTEM, channel = %channel, joined = peers.len(), "Peers joined");
        self.broadcast_heads(&channel).await;
    }

    async fn on_request(&self, _channel: ChannelId, from: PeerId, request: RpcRequest) -> RpcResponse {
        self.answer_request(from, request)
    }
}
