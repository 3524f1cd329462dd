//! # Message Store
//!
//! Typed tables over one ordered keyspace. All access goes through
//! [`MessageStore::transaction`]: reads inside a transaction see its own
//! buffered writes, and the writes are committed as one atomic batch when the
//! closure returns `Ok`. An `Err` discards them.
//!
//! The backend lock is held for the whole closure, so a transaction never
//! interleaves with another one.

use crate::domain::errors::StoreError;
use crate::domain::keys::{self, KeyPrefix};
use crate::ports::outbound::{BatchOperation, InMemoryKVStore, KeyValueStore};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use shared_types::{
    Channel, ChannelId, ChainMessage, PeerId, PeerRecord, Round, SerializedState, Signature,
    StateTag, StoredMessage,
};
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;

/// Entries fetched per step when walking a table backwards.
const SCAN_CHUNK: usize = 32;

/// Shared handle to the store. Cheap to share behind an `Arc`.
pub struct MessageStore {
    kv: Mutex<Box<dyn KeyValueStore>>,
}

impl MessageStore {
    pub fn new(kv: Box<dyn KeyValueStore>) -> Self {
        Self { kv: Mutex::new(kv) }
    }

    pub fn in_memory() -> Self {
        Self::new(Box::new(InMemoryKVStore::new()))
    }

    /// Run `f` inside an atomic read/write transaction.
    pub fn transaction<R, E, F>(&self, f: F) -> Result<R, E>
    where
        E: From<StoreError>,
        F: FnOnce(&mut StoreTxn<'_>) -> Result<R, E>,
    {
        let mut guard = self.kv.lock();
        let (result, writes) = {
            let mut txn = StoreTxn::new(&**guard);
            let result = f(&mut txn);
            (result, txn.writes)
        };
        let value = result?;
        if !writes.is_empty() {
            let ops = writes
                .into_iter()
                .map(|(key, value)| match value {
                    Some(value) => BatchOperation::Put { key, value },
                    None => BatchOperation::Delete { key },
                })
                .collect();
            guard
                .atomic_batch_write(ops)
                .map_err(|e| E::from(StoreError::from(e)))?;
        }
        Ok(value)
    }

    /// Destructive reset: removes every record.
    pub fn reset(&self) -> Result<(), StoreError> {
        let mut guard = self.kv.lock();
        let ops = guard
            .prefix_scan(&[])?
            .into_iter()
            .map(|(key, _)| BatchOperation::Delete { key })
            .collect();
        guard.atomic_batch_write(ops)?;
        tracing::warn!("Message store reset");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Single-operation shorthands
    // -------------------------------------------------------------------------

    pub fn put_message(&self, message: &ChainMessage) -> Result<Option<u64>, StoreError> {
        self.transaction(|t| t.put_message(message))
    }

    pub fn get_message(&self, sig: &Signature) -> Result<Option<StoredMessage>, StoreError> {
        self.transaction(|t| t.get_message(sig))
    }

    pub fn has_message(&self, sig: &Signature) -> Result<bool, StoreError> {
        self.transaction(|t| t.has_message(sig))
    }

    pub fn last_by_peer(&self, peer: &PeerId) -> Result<Option<StoredMessage>, StoreError> {
        self.transaction(|t| t.last_by_peer(peer))
    }

    pub fn messages_by_peer(
        &self,
        peer: &PeerId,
        from: u64,
        to: u64,
    ) -> Result<Vec<ChainMessage>, StoreError> {
        self.transaction(|t| t.messages_by_peer(peer, from, to))
    }

    pub fn get_channel(&self, id: &ChannelId) -> Result<Option<Channel>, StoreError> {
        self.transaction(|t| t.get_channel(id))
    }

    pub fn channels(&self) -> Result<Vec<Channel>, StoreError> {
        self.transaction(|t| t.channels())
    }

    pub fn get_peer(&self, peer: &PeerId) -> Result<Option<PeerRecord>, StoreError> {
        self.transaction(|t| t.get_peer(peer))
    }

    pub fn peers(&self) -> Result<Vec<PeerRecord>, StoreError> {
        self.transaction(|t| t.peers())
    }

    pub fn put_peer(&self, record: &PeerRecord) -> Result<(), StoreError> {
        self.transaction(|t| t.put_peer(record))
    }

    pub fn clear_peers(&self) -> Result<(), StoreError> {
        self.transaction(|t| t.clear_peers())
    }

    pub fn current_arrived(&self) -> Result<u64, StoreError> {
        self.transaction(|t| t.current_arrived())
    }
}

impl Default for MessageStore {
    fn default() -> Self {
        Self::in_memory()
    }
}

/// A read/write transaction. See [`MessageStore::transaction`].
pub struct StoreTxn<'a> {
    kv: &'a dyn KeyValueStore,
    writes: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
}

fn bounds<'k>(start: &'k [u8], end: &'k [u8]) -> (Bound<&'k [u8]>, Bound<&'k [u8]>) {
    let end = if start <= end { end } else { start };
    (Bound::Included(start), Bound::Excluded(end))
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
    Ok(bincode::serialize(value)?)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
    Ok(bincode::deserialize(bytes)?)
}

impl<'a> StoreTxn<'a> {
    fn new(kv: &'a dyn KeyValueStore) -> Self {
        Self {
            kv,
            writes: BTreeMap::new(),
        }
    }

    // -------------------------------------------------------------------------
    // Raw access (overlay-aware)
    // -------------------------------------------------------------------------

    fn raw_get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        if let Some(buffered) = self.writes.get(key) {
            return Ok(buffered.clone());
        }
        Ok(self.kv.get(key)?)
    }

    fn raw_put(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.writes.insert(key, Some(value));
    }

    #[cfg(test)]
    fn raw_delete(&mut self, key: Vec<u8>) {
        self.writes.insert(key, None);
    }

    /// Up to `limit` merged entries in `[start, end)`.
    fn raw_scan(
        &self,
        start: &[u8],
        end: &[u8],
        limit: usize,
        reverse: bool,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
        let overlay: Vec<(&Vec<u8>, &Option<Vec<u8>>)> =
            self.writes.range::<[u8], _>(bounds(start, end)).collect();
        let deletes = overlay.iter().filter(|(_, v)| v.is_none()).count();
        let fetch = limit.saturating_add(deletes);

        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> = self
            .kv
            .range_limit(start, end, fetch, reverse)?
            .into_iter()
            .collect();
        for (key, value) in overlay {
            match value {
                Some(value) => {
                    merged.insert(key.clone(), value.clone());
                }
                None => {
                    merged.remove(key);
                }
            }
        }

        Ok(if reverse {
            merged.into_iter().rev().take(limit).collect()
        } else {
            merged.into_iter().take(limit).collect()
        })
    }

    fn raw_range(&self, start: &[u8], end: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
        self.raw_scan(start, end, usize::MAX, false)
    }

    fn get_typed<T: DeserializeOwned>(&self, key: &[u8]) -> Result<Option<T>, StoreError> {
        self.raw_get(key)?.map(|bytes| decode(&bytes)).transpose()
    }

    fn put_typed<T: Serialize>(&mut self, key: Vec<u8>, value: &T) -> Result<(), StoreError> {
        let bytes = encode(value)?;
        self.raw_put(key, bytes);
        Ok(())
    }

    fn messages_for(&self, sigs: Vec<(Vec<u8>, Vec<u8>)>) -> Result<Vec<StoredMessage>, StoreError> {
        let mut out = Vec::with_capacity(sigs.len());
        for (_, sig_bytes) in sigs {
            let sig = keys::read_sig(&sig_bytes, 0, "index")?;
            if let Some(stored) = self.get_message(&sig)? {
                out.push(stored);
            }
        }
        Ok(out)
    }

    // -------------------------------------------------------------------------
    // Messages
    // -------------------------------------------------------------------------

    /// Local receipt counter (0 before anything was stored).
    pub fn current_arrived(&self) -> Result<u64, StoreError> {
        match self.raw_get(&keys::meta_key(keys::ARRIVED_COUNTER))? {
            Some(bytes) => keys::read_u64(&bytes, 0, KeyPrefix::Meta.table()),
            None => Ok(0),
        }
    }

    fn next_arrived(&mut self) -> Result<u64, StoreError> {
        let next = self.current_arrived()? + 1;
        self.raw_put(
            keys::meta_key(keys::ARRIVED_COUNTER),
            next.to_be_bytes().to_vec(),
        );
        Ok(next)
    }

    /// Store a message and index it. Idempotent by signature: returns the
    /// allocated `arrived` stamp, or `None` if the message was already here.
    pub fn put_message(&mut self, message: &ChainMessage) -> Result<Option<u64>, StoreError> {
        let key = keys::message_key(&message.sig);
        if self.raw_get(&key)?.is_some() {
            return Ok(None);
        }

        let arrived = self.next_arrived()?;
        let sig_bytes = message.sig.as_bytes().to_vec();
        self.put_typed(
            key,
            &StoredMessage {
                message: message.clone(),
                arrived,
            },
        )?;

        let height_key = keys::peer_height_key(&message.peer, message.height);
        if self.raw_get(&height_key)?.is_none() {
            self.raw_put(height_key, sig_bytes.clone());
        } else {
            tracing::warn!(
                peer_id = %message.peer.short(),
                height = message.height,
                "Second message at an occupied height, keeping the first"
            );
        }

        if let Some(round) = message.input_round() {
            let input_key = keys::input_key(&message.channel(), round, &message.peer);
            // One slot per (round, peer); the higher height wins regardless of
            // arrival order.
            let keep_existing = match self.raw_get(&input_key)? {
                Some(existing) => {
                    let existing = keys::read_sig(&existing, 0, KeyPrefix::Input.table())?;
                    self.get_message(&existing)?
                        .map(|m| m.message.height >= message.height)
                        .unwrap_or(false)
                }
                None => false,
            };
            if !keep_existing {
                self.raw_put(input_key, sig_bytes.clone());
            }
        }

        self.raw_put(keys::arrived_key(arrived), sig_bytes);
        for acked in &message.acks {
            self.raw_put(keys::ack_key(acked, &message.peer, &message.sig), Vec::new());
        }
        Ok(Some(arrived))
    }

    pub fn get_message(&self, sig: &Signature) -> Result<Option<StoredMessage>, StoreError> {
        self.get_typed(&keys::message_key(sig))
    }

    pub fn has_message(&self, sig: &Signature) -> Result<bool, StoreError> {
        Ok(self.raw_get(&keys::message_key(sig))?.is_some())
    }

    /// The peer's highest-height message.
    pub fn last_by_peer(&self, peer: &PeerId) -> Result<Option<StoredMessage>, StoreError> {
        Ok(self.recent_by_peer(peer, 1)?.pop())
    }

    /// Up to `n` of the peer's messages, highest height first.
    pub fn recent_by_peer(&self, peer: &PeerId, n: usize) -> Result<Vec<StoredMessage>, StoreError> {
        let prefix = keys::peer_height_prefix(peer);
        let entries = self.raw_scan(&prefix, &keys::prefix_end(&prefix), n, true)?;
        self.messages_for(entries)
    }

    /// Up to `n` of the peer's messages with `height <= top`, highest first.
    pub fn recent_by_peer_from(
        &self,
        peer: &PeerId,
        top: u64,
        n: usize,
    ) -> Result<Vec<StoredMessage>, StoreError> {
        let prefix = keys::peer_height_prefix(peer);
        let end = match top.checked_add(1) {
            Some(next) => keys::peer_height_key(peer, next),
            None => keys::prefix_end(&prefix),
        };
        let entries = self.raw_scan(&prefix, &end, n, true)?;
        self.messages_for(entries)
    }

    /// The peer's messages with `from <= height <= to`, by height.
    pub fn messages_by_peer(
        &self,
        peer: &PeerId,
        from: u64,
        to: u64,
    ) -> Result<Vec<ChainMessage>, StoreError> {
        let start = keys::peer_height_key(peer, from);
        let end = match to.checked_add(1) {
            Some(next) => keys::peer_height_key(peer, next),
            None => keys::prefix_end(&keys::peer_height_prefix(peer)),
        };
        Ok(self
            .messages_for(self.raw_range(&start, &end)?)?
            .into_iter()
            .map(|s| s.message)
            .collect())
    }

    /// Highest `h` such that heights `0..=h` are all stored. `known_valid` is
    /// a height already known to be contiguous, to skip rescanning.
    pub fn contiguous_height(
        &self,
        peer: &PeerId,
        known_valid: Option<u64>,
    ) -> Result<Option<u64>, StoreError> {
        let mut expected = known_valid.map_or(0, |h| h + 1);
        let start = keys::peer_height_key(peer, expected);
        let end = keys::prefix_end(&keys::peer_height_prefix(peer));
        for (key, _) in self.raw_range(&start, &end)? {
            let height = keys::read_u64(&key, 1 + 32, KeyPrefix::PeerHeight.table())?;
            if height != expected {
                break;
            }
            expected += 1;
        }
        Ok(expected.checked_sub(1))
    }

    /// Inputs of a channel with `after < round <= to`, ordered by round then
    /// peer.
    pub fn inputs_in_range(
        &self,
        channel: &ChannelId,
        after: Round,
        to: Round,
    ) -> Result<Vec<StoredMessage>, StoreError> {
        if to <= after {
            return Ok(Vec::new());
        }
        let start = keys::input_round_start(channel, after + 1);
        let end = match to.checked_add(1) {
            Some(next) => keys::input_round_start(channel, next),
            None => keys::prefix_end(&keys::input_prefix(channel)),
        };
        self.messages_for(self.raw_range(&start, &end)?)
    }

    /// Latest input round in a channel, optionally for one author.
    pub fn latest_input_round(
        &self,
        channel: &ChannelId,
        peer: Option<&PeerId>,
    ) -> Result<Option<Round>, StoreError> {
        let Some(peer) = peer else {
            let prefix = keys::input_prefix(channel);
            let last = self.raw_scan(&prefix, &keys::prefix_end(&prefix), 1, true)?;
            return last
                .first()
                .map(|(key, _)| keys::read_u64(key, 1 + 64, KeyPrefix::Input.table()))
                .transpose();
        };

        // Walk the author's chain from the top; their latest input for the
        // channel is almost always among the first few entries.
        let prefix = keys::peer_height_prefix(peer);
        let mut end = keys::prefix_end(&prefix);
        loop {
            let chunk = self.raw_scan(&prefix, &end, SCAN_CHUNK, true)?;
            let Some((lowest, _)) = chunk.last() else {
                return Ok(None);
            };
            let next_end = lowest.clone();
            for stored in self.messages_for(chunk)? {
                if stored.message.channel() == *channel {
                    if let Some(round) = stored.message.input_round() {
                        return Ok(Some(round));
                    }
                }
            }
            end = next_end;
        }
    }

    pub fn earliest_input_round(&self, channel: &ChannelId) -> Result<Option<Round>, StoreError> {
        let prefix = keys::input_prefix(channel);
        let first = self.raw_scan(&prefix, &keys::prefix_end(&prefix), 1, false)?;
        first
            .first()
            .map(|(key, _)| keys::read_u64(key, 1 + 64, KeyPrefix::Input.table()))
            .transpose()
    }

    /// Messages stored after the given `arrived` stamp, in arrival order.
    pub fn arrived_after(&self, stamp: u64) -> Result<Vec<StoredMessage>, StoreError> {
        let Some(next) = stamp.checked_add(1) else {
            return Ok(Vec::new());
        };
        let start = keys::arrived_key(next);
        let end = keys::prefix_end(&[KeyPrefix::Arrived.byte()]);
        self.messages_for(self.raw_range(&start, &end)?)
    }

    /// Distinct peers in `among` (other than the author) that acked `sig` or
    /// any later message of the same author. Counting stops at `needed`.
    pub fn confirmations(
        &self,
        sig: &Signature,
        among: &[PeerId],
        needed: usize,
    ) -> Result<usize, StoreError> {
        self.confirmations_as_of(sig, among, needed, u64::MAX)
    }

    /// `confirmations` counting only acks carried by messages with
    /// `arrived <= as_of`.
    pub fn confirmations_as_of(
        &self,
        sig: &Signature,
        among: &[PeerId],
        needed: usize,
        as_of: u64,
    ) -> Result<usize, StoreError> {
        let Some(stored) = self.get_message(sig)? else {
            return Ok(0);
        };
        let author = stored.message.peer;
        let mut confirmed: BTreeSet<PeerId> = BTreeSet::new();
        if needed == 0 {
            return Ok(0);
        }

        let start = keys::peer_height_key(&author, stored.message.height);
        let end = keys::prefix_end(&keys::peer_height_prefix(&author));
        for (_, later_sig) in self.raw_range(&start, &end)? {
            let later_sig = keys::read_sig(&later_sig, 0, KeyPrefix::PeerHeight.table())?;
            let ack_prefix = keys::ack_prefix(&later_sig);
            for (key, _) in self.raw_range(&ack_prefix, &keys::prefix_end(&ack_prefix))? {
                let acker = keys::read_peer(&key, 1 + 64, KeyPrefix::Ack.table())?;
                if acker == author || !among.contains(&acker) || confirmed.contains(&acker) {
                    continue;
                }
                if as_of != u64::MAX {
                    let acker_sig = keys::read_sig(&key, 1 + 64 + 32, KeyPrefix::Ack.table())?;
                    let seen = self
                        .get_message(&acker_sig)?
                        .is_some_and(|acking| acking.arrived <= as_of);
                    if !seen {
                        continue;
                    }
                }
                confirmed.insert(acker);
                if confirmed.len() >= needed {
                    return Ok(confirmed.len());
                }
            }
        }
        Ok(confirmed.len())
    }

    // -------------------------------------------------------------------------
    // Channels and peers
    // -------------------------------------------------------------------------

    pub fn put_channel(&mut self, channel: &Channel) -> Result<(), StoreError> {
        self.put_typed(keys::channel_key(&channel.id), channel)
    }

    pub fn get_channel(&self, id: &ChannelId) -> Result<Option<Channel>, StoreError> {
        self.get_typed(&keys::channel_key(id))
    }

    pub fn channels(&self) -> Result<Vec<Channel>, StoreError> {
        let prefix = [KeyPrefix::Channel.byte()];
        self.raw_range(&prefix, &keys::prefix_end(&prefix))?
            .into_iter()
            .map(|(_, v)| decode(&v))
            .collect()
    }

    pub fn put_peer(&mut self, record: &PeerRecord) -> Result<(), StoreError> {
        self.put_typed(keys::peer_key(&record.peer_id), record)
    }

    pub fn get_peer(&self, peer: &PeerId) -> Result<Option<PeerRecord>, StoreError> {
        self.get_typed(&keys::peer_key(peer))
    }

    pub fn peers(&self) -> Result<Vec<PeerRecord>, StoreError> {
        let prefix = [KeyPrefix::Peer.byte()];
        self.raw_range(&prefix, &keys::prefix_end(&prefix))?
            .into_iter()
            .map(|(_, v)| decode(&v))
            .collect()
    }

    /// Reset session liveness on every peer record; records stay.
    pub fn clear_peers(&mut self) -> Result<(), StoreError> {
        for mut record in self.peers()? {
            record.connected = false;
            record.proxy = false;
            record.sees.clear();
            self.put_peer(&record)?;
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Checkpoints
    // -------------------------------------------------------------------------

    /// Write (or overwrite) the checkpoint at `(channel, round)`.
    pub fn put_state(&mut self, state: &SerializedState) -> Result<(), StoreError> {
        self.put_typed(keys::state_key(&state.channel, state.round), state)
    }

    pub fn get_state(
        &self,
        channel: &ChannelId,
        round: Round,
    ) -> Result<Option<SerializedState>, StoreError> {
        self.get_typed(&keys::state_key(channel, round))
    }

    /// Newest `Accepted` checkpoint with `round <= at`.
    pub fn latest_state_at_or_before(
        &self,
        channel: &ChannelId,
        at: Round,
    ) -> Result<Option<SerializedState>, StoreError> {
        let prefix = keys::state_prefix(channel);
        let mut end = match at.checked_add(1) {
            Some(next) => keys::state_key(channel, next),
            None => keys::prefix_end(&prefix),
        };
        loop {
            let chunk = self.raw_scan(&prefix, &end, SCAN_CHUNK, true)?;
            let Some((lowest, _)) = chunk.last() else {
                return Ok(None);
            };
            let next_end = lowest.clone();
            for (_, value) in chunk {
                let state: SerializedState = decode(&value)?;
                if state.tag == StateTag::Accepted {
                    return Ok(Some(state));
                }
            }
            end = next_end;
        }
    }

    /// Re-tag every `Accepted` checkpoint with `round >= from` as `Unknown`.
    /// Returns how many were superseded.
    pub fn supersede_states_from(
        &mut self,
        channel: &ChannelId,
        from: Round,
    ) -> Result<usize, StoreError> {
        let start = keys::state_key(channel, from);
        let end = keys::prefix_end(&keys::state_prefix(channel));
        let mut superseded = 0;
        for (key, value) in self.raw_range(&start, &end)? {
            let mut state: SerializedState = decode(&value)?;
            if state.tag == StateTag::Accepted {
                state.tag = StateTag::Unknown;
                self.put_typed(key, &state)?;
                superseded += 1;
            }
        }
        Ok(superseded)
    }

    #[cfg(test)]
    fn delete_message_index(&mut self, message: &ChainMessage) {
        self.raw_delete(keys::message_key(&message.sig));
        self.raw_delete(keys::peer_height_key(&message.peer, message.height));
        if let Some(round) = message.input_round() {
            self.raw_delete(keys::input_key(&message.channel(), round, &message.peer));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::{ChainBody, GameSnapshot};

    fn channel() -> ChannelId {
        ChannelId::from_genesis(Signature::new([0xcc; 64]))
    }

    fn peer(n: u8) -> PeerId {
        PeerId::new([n; 32])
    }

    fn input(author: u8, height: u64, round: Round, acks: Vec<Signature>) -> ChainMessage {
        let mut sig = [author; 64];
        sig[..8].copy_from_slice(&height.to_be_bytes());
        ChainMessage {
            body: ChainBody::Input {
                round,
                channel: channel(),
                data: 1,
            },
            peer: peer(author),
            parent: None,
            height,
            acks,
            sig: Signature::new(sig),
        }
    }

    fn state(round: Round, tag: StateTag) -> SerializedState {
        SerializedState {
            channel: channel(),
            tag,
            round,
            arrived: 0,
            ceiling: round,
            state: GameSnapshot {
                t: round * 50,
                data: vec![round as u8],
                inputs: vec![],
            },
        }
    }

    #[test]
    fn test_put_message_is_idempotent() {
        let store = MessageStore::in_memory();
        let msg = input(1, 0, 10, vec![]);
        assert_eq!(store.put_message(&msg).unwrap(), Some(1));
        assert_eq!(store.put_message(&msg).unwrap(), None);
        assert_eq!(store.current_arrived().unwrap(), 1);
        assert_eq!(store.messages_by_peer(&peer(1), 0, u64::MAX).unwrap().len(), 1);
    }

    #[test]
    fn test_failed_transaction_discards_writes() {
        let store = MessageStore::in_memory();
        let msg = input(1, 0, 10, vec![]);
        let result: Result<(), StoreError> = store.transaction(|t| {
            t.put_message(&msg)?;
            assert!(t.has_message(&msg.sig)?);
            Err(StoreError::CorruptKey { table: "test" })
        });
        assert!(result.is_err());
        assert!(!store.has_message(&msg.sig).unwrap());
        assert_eq!(store.current_arrived().unwrap(), 0);
    }

    #[test]
    fn test_recent_and_last_by_peer() {
        let store = MessageStore::in_memory();
        for h in 0..5 {
            store.put_message(&input(2, h, 100 + h, vec![])).unwrap();
        }
        let recent = store.transaction(|t| t.recent_by_peer(&peer(2), 2)).unwrap();
        let heights: Vec<u64> = recent.iter().map(|s| s.message.height).collect();
        assert_eq!(heights, vec![4, 3]);
        assert_eq!(store.last_by_peer(&peer(2)).unwrap().unwrap().message.height, 4);
        assert!(store.last_by_peer(&peer(3)).unwrap().is_none());
    }

    #[test]
    fn test_recent_by_peer_from_walks_down() {
        let store = MessageStore::in_memory();
        for height in [0, 1, 2, 4, 5] {
            store.put_message(&input(1, height, 10 + height, vec![])).unwrap();
        }
        store.put_message(&input(2, 3, 13, vec![])).unwrap();

        let heights = |top, n| {
            store
                .transaction(|t| t.recent_by_peer_from(&peer(1), top, n))
                .unwrap()
                .into_iter()
                .map(|m| m.message.height)
                .collect::<Vec<_>>()
        };
        assert_eq!(heights(4, 3), vec![4, 2, 1]);
        assert_eq!(heights(3, 10), vec![2, 1, 0]);
        assert_eq!(heights(u64::MAX, 1), vec![5]);
    }

    #[test]
    fn test_contiguous_height_stops_at_gap() {
        let store = MessageStore::in_memory();
        for h in [0, 1, 2, 4, 5] {
            store.put_message(&input(3, h, 10 + h, vec![])).unwrap();
        }
        let valid = store
            .transaction(|t| t.contiguous_height(&peer(3), None))
            .unwrap();
        assert_eq!(valid, Some(2));
        let from_hint = store
            .transaction(|t| t.contiguous_height(&peer(3), Some(1)))
            .unwrap();
        assert_eq!(from_hint, Some(2));
        let none = store
            .transaction(|t| t.contiguous_height(&peer(9), None))
            .unwrap();
        assert_eq!(none, None);
    }

    #[test]
    fn test_inputs_in_range_ordered_by_round_then_peer() {
        let store = MessageStore::in_memory();
        store.put_message(&input(2, 0, 11, vec![])).unwrap();
        store.put_message(&input(1, 0, 12, vec![])).unwrap();
        store.put_message(&input(1, 1, 11, vec![])).unwrap();
        store.put_message(&input(3, 0, 20, vec![])).unwrap();

        let inputs = store
            .transaction(|t| t.inputs_in_range(&channel(), 10, 12))
            .unwrap();
        let order: Vec<(Round, u8)> = inputs
            .iter()
            .map(|s| (s.message.input_round().unwrap(), s.message.peer.as_bytes()[0]))
            .collect();
        assert_eq!(order, vec![(11, 1), (11, 2), (12, 1)]);

        let (earliest, latest, latest_p1) = store
            .transaction(|t| {
                Ok::<_, StoreError>((
                    t.earliest_input_round(&channel())?,
                    t.latest_input_round(&channel(), None)?,
                    t.latest_input_round(&channel(), Some(&peer(1)))?,
                ))
            })
            .unwrap();
        assert_eq!(earliest, Some(11));
        assert_eq!(latest, Some(20));
        assert_eq!(latest_p1, Some(11));
    }

    #[test]
    fn test_same_round_slot_keeps_higher_height() {
        let store = MessageStore::in_memory();
        let high = input(1, 5, 30, vec![]);
        let low = input(1, 4, 30, vec![]);
        store.put_message(&high).unwrap();
        store.put_message(&low).unwrap();
        let inputs = store
            .transaction(|t| t.inputs_in_range(&channel(), 29, 30))
            .unwrap();
        assert_eq!(inputs.len(), 1);
        assert_eq!(inputs[0].message.sig, high.sig);
    }

    #[test]
    fn test_arrived_after() {
        let store = MessageStore::in_memory();
        for h in 0..3 {
            store.put_message(&input(1, h, h, vec![])).unwrap();
        }
        let after = store.transaction(|t| t.arrived_after(1)).unwrap();
        let stamps: Vec<u64> = after.iter().map(|s| s.arrived).collect();
        assert_eq!(stamps, vec![2, 3]);
    }

    #[test]
    fn test_confirmations_count_later_acks_from_distinct_peers() {
        let store = MessageStore::in_memory();
        let a0 = input(1, 0, 10, vec![]);
        let a1 = input(1, 1, 11, vec![]);
        store.put_message(&a0).unwrap();
        store.put_message(&a1).unwrap();
        // Peer 2 acks a0 directly, peer 3 acks the later a1, peer 2 twice.
        store.put_message(&input(2, 0, 12, vec![a0.sig])).unwrap();
        store.put_message(&input(2, 1, 13, vec![a1.sig])).unwrap();
        store.put_message(&input(3, 0, 12, vec![a1.sig])).unwrap();

        let all = [peer(1), peer(2), peer(3)];
        let count = store
            .transaction(|t| t.confirmations(&a0.sig, &all, usize::MAX))
            .unwrap();
        assert_eq!(count, 2);
        let capped = store
            .transaction(|t| t.confirmations(&a0.sig, &all, 1))
            .unwrap();
        assert_eq!(capped, 1);
        let outsiders_excluded = store
            .transaction(|t| t.confirmations(&a0.sig, &[peer(2)], usize::MAX))
            .unwrap();
        assert_eq!(outsiders_excluded, 1);
    }

    #[test]
    fn test_confirmations_as_of_ignores_later_acks() {
        let store = MessageStore::in_memory();
        let a0 = input(1, 0, 10, vec![]);
        store.put_message(&a0).unwrap();
        let first_ack = store.put_message(&input(2, 0, 12, vec![a0.sig])).unwrap().unwrap();
        let second_ack = store.put_message(&input(3, 0, 12, vec![a0.sig])).unwrap().unwrap();

        let all = [peer(1), peer(2), peer(3)];
        let count_at = |as_of| {
            store
                .transaction(|t| t.confirmations_as_of(&a0.sig, &all, usize::MAX, as_of))
                .unwrap()
        };
        assert_eq!(count_at(first_ack - 1), 0);
        assert_eq!(count_at(first_ack), 1);
        assert_eq!(count_at(second_ack), 2);
        assert_eq!(count_at(u64::MAX), 2);
    }

    #[test]
    fn test_checkpoint_lookup_and_supersede() {
        let store = MessageStore::in_memory();
        store
            .transaction(|t| {
                t.put_state(&state(200, StateTag::Accepted))?;
                t.put_state(&state(400, StateTag::Accepted))?;
                t.put_state(&state(600, StateTag::Accepted))
            })
            .unwrap();

        let found = store
            .transaction(|t| t.latest_state_at_or_before(&channel(), 599))
            .unwrap();
        assert_eq!(found.map(|s| s.round), Some(400));

        let superseded = store
            .transaction(|t| t.supersede_states_from(&channel(), 400))
            .unwrap();
        assert_eq!(superseded, 2);

        let found = store
            .transaction(|t| t.latest_state_at_or_before(&channel(), u64::MAX))
            .unwrap();
        assert_eq!(found.map(|s| s.round), Some(200));
        let kept = store.transaction(|t| t.get_state(&channel(), 600)).unwrap();
        assert_eq!(kept.map(|s| s.tag), Some(StateTag::Unknown));
    }

    #[test]
    fn test_clear_peers_keeps_records() {
        let store = MessageStore::in_memory();
        let mut record = PeerRecord::new(peer(4));
        record.connected = true;
        record.sees = vec![peer(5)];
        store.put_peer(&record).unwrap();
        store.clear_peers().unwrap();
        let cleared = store.get_peer(&peer(4)).unwrap().unwrap();
        assert!(!cleared.connected);
        assert!(cleared.sees.is_empty());
    }

    #[test]
    fn test_reset_removes_everything() {
        let store = MessageStore::in_memory();
        store.put_message(&input(1, 0, 1, vec![])).unwrap();
        store.reset().unwrap();
        assert_eq!(store.current_arrived().unwrap(), 0);
        assert!(store.last_by_peer(&peer(1)).unwrap().is_none());
    }

    #[test]
    fn test_scan_sees_buffered_deletes() {
        let store = MessageStore::in_memory();
        let msgs: Vec<ChainMessage> = (0..3).map(|h| input(1, h, h, vec![])).collect();
        for m in &msgs {
            store.put_message(m).unwrap();
        }
        let last = store
            .transaction(|t| {
                t.delete_message_index(&msgs[2]);
                t.last_by_peer(&peer(1))
            })
            .unwrap();
        assert_eq!(last.map(|s| s.message.height), Some(1));
    }
}
