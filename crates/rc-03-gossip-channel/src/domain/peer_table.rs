//! Peer liveness as seen by the gossip layer.
//!
//! The table tracks which peers are directly connected on each joined
//! channel and what their latest keep-alive said. Every mutation returns the
//! records that changed so the caller can forward them upstream. Height
//! fields of [`PeerRecord`] are left untouched here; they belong to the log.

use shared_types::{ChannelId, KeepAlive, PeerId, PeerRecord};
use std::collections::{BTreeSet, HashMap};

/// Result of offering a keep-alive to the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeepAliveOutcome {
    Accepted(PeerRecord),
    /// Timestamp not newer than the last accepted one.
    Stale,
}

#[derive(Debug, Default)]
pub struct PeerTable {
    records: HashMap<PeerId, PeerRecord>,
    direct: HashMap<ChannelId, BTreeSet<PeerId>>,
}

impl PeerTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, peer: &PeerId) -> Option<&PeerRecord> {
        self.records.get(peer)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Directly connected peers on `channel`, sorted.
    pub fn connected(&self, channel: &ChannelId) -> Vec<PeerId> {
        self.direct
            .get(channel)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Number of distinct peers directly connected on any channel.
    pub fn connected_count(&self) -> usize {
        self.records.values().filter(|r| r.connected).count()
    }

    /// Replace the direct set of `channel` and return the peers whose
    /// connectivity changed.
    pub fn sync_connected(
        &mut self,
        channel: &ChannelId,
        connected: &[PeerId],
        now: u64,
    ) -> Vec<PeerRecord> {
        let next: BTreeSet<PeerId> = connected.iter().copied().collect();
        let previous = self.direct.insert(*channel, next.clone()).unwrap_or_default();

        let mut changed = Vec::new();
        for peer in next.difference(&previous) {
            let record = self.entry(*peer, channel);
            record.last_seen = record.last_seen.max(now);
            changed.push(*peer);
        }
        for peer in previous.difference(&next) {
            changed.push(*peer);
        }
        changed
            .into_iter()
            .map(|peer| self.refresh(peer))
            .collect()
    }

    /// Apply a verified keep-alive received on `channel`.
    pub fn accept_keep_alive(
        &mut self,
        channel: &ChannelId,
        keep_alive: &KeepAlive,
        now: u64,
    ) -> KeepAliveOutcome {
        let record = self.entry(keep_alive.peer, channel);
        if record
            .last_keep_alive
            .is_some_and(|last| keep_alive.timestamp <= last)
        {
            return KeepAliveOutcome::Stale;
        }
        record.last_keep_alive = Some(keep_alive.timestamp);
        record.last_seen = record.last_seen.max(now);
        record.sees = keep_alive.sees.clone();
        if record.name.is_none() {
            record.name = keep_alive.name.clone();
        }
        KeepAliveOutcome::Accepted(self.refresh(keep_alive.peer))
    }

    /// Note traffic from `peer`. Returns the record when the peer was not
    /// known on `channel` before.
    pub fn touch(&mut self, channel: &ChannelId, peer: PeerId, now: u64) -> Option<PeerRecord> {
        let known = self
            .records
            .get(&peer)
            .is_some_and(|r| r.channels.contains(channel));
        let record = self.entry(peer, channel);
        record.last_seen = record.last_seen.max(now);
        if known {
            None
        } else {
            Some(self.refresh(peer))
        }
    }

    /// Forget the direct set of `channel`; returns peers that lost their
    /// connection as a result.
    pub fn leave_channel(&mut self, channel: &ChannelId) -> Vec<PeerRecord> {
        let previous = self.direct.remove(channel).unwrap_or_default();
        previous
            .into_iter()
            .map(|peer| self.refresh(peer))
            .filter(|record| !record.connected)
            .collect()
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.direct.clear();
    }

    fn entry(&mut self, peer: PeerId, channel: &ChannelId) -> &mut PeerRecord {
        let record = self
            .records
            .entry(peer)
            .or_insert_with(|| PeerRecord::new(peer));
        record.add_channel(*channel);
        record
    }

    // Recompute connected/proxy from the direct sets and return a snapshot.
    fn refresh(&mut self, peer: PeerId) -> PeerRecord {
        let direct = self.direct.values().any(|set| set.contains(&peer));
        let record = self
            .records
            .entry(peer)
            .or_insert_with(|| PeerRecord::new(peer));
        record.connected = direct;
        record.proxy = !direct;
        record.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::Signature;

    fn peer(n: u8) -> PeerId {
        PeerId::new([n; 32])
    }

    fn channel(n: u8) -> ChannelId {
        ChannelId::from_genesis(Signature::new([n; 64]))
    }

    fn keep_alive(from: u8, timestamp: u64, name: Option<&str>) -> KeepAlive {
        KeepAlive {
            peer: peer(from),
            timestamp,
            sees: vec![peer(9)],
            name: name.map(String::from),
            sig: Signature::new([0; 64]),
        }
    }

    #[test]
    fn test_sync_reports_joins_and_leaves() {
        let mut table = PeerTable::new();
        let ch = channel(1);

        let changed = table.sync_connected(&ch, &[peer(1), peer(2)], 100);
        assert_eq!(changed.len(), 2);
        assert!(changed.iter().all(|r| r.connected && !r.proxy));
        assert_eq!(table.connected_count(), 2);

        assert!(table.sync_connected(&ch, &[peer(1), peer(2)], 200).is_empty());

        let changed = table.sync_connected(&ch, &[peer(2)], 300);
        assert_eq!(changed.len(), 1);
        assert_eq!(changed[0].peer_id, peer(1));
        assert!(!changed[0].connected);
        assert_eq!(table.connected(&ch), vec![peer(2)]);
    }

    #[test]
    fn test_connected_on_another_channel_stays_connected() {
        let mut table = PeerTable::new();
        table.sync_connected(&channel(1), &[peer(1)], 0);
        table.sync_connected(&channel(2), &[peer(1)], 0);

        let changed = table.sync_connected(&channel(1), &[], 10);
        assert_eq!(changed.len(), 1);
        assert!(changed[0].connected);
        assert_eq!(changed[0].channels.len(), 2);
    }

    #[test]
    fn test_keep_alive_requires_newer_timestamp() {
        let mut table = PeerTable::new();
        let ch = channel(1);

        assert!(matches!(
            table.accept_keep_alive(&ch, &keep_alive(1, 10, None), 500),
            KeepAliveOutcome::Accepted(_)
        ));
        assert_eq!(
            table.accept_keep_alive(&ch, &keep_alive(1, 10, None), 600),
            KeepAliveOutcome::Stale
        );
        assert_eq!(
            table.accept_keep_alive(&ch, &keep_alive(1, 9, None), 600),
            KeepAliveOutcome::Stale
        );

        let KeepAliveOutcome::Accepted(record) =
            table.accept_keep_alive(&ch, &keep_alive(1, 11, None), 700)
        else {
            panic!("newer keep-alive rejected");
        };
        assert_eq!(record.last_keep_alive, Some(11));
        assert_eq!(record.last_seen, 700);
        assert_eq!(record.sees, vec![peer(9)]);
    }

    #[test]
    fn test_name_is_set_once() {
        let mut table = PeerTable::new();
        let ch = channel(1);
        table.accept_keep_alive(&ch, &keep_alive(1, 1, Some("ana")), 0);
        table.accept_keep_alive(&ch, &keep_alive(1, 2, Some("eve")), 0);
        assert_eq!(table.get(&peer(1)).unwrap().name.as_deref(), Some("ana"));
    }

    #[test]
    fn test_keep_alive_from_unlinked_peer_is_proxy() {
        let mut table = PeerTable::new();
        let KeepAliveOutcome::Accepted(record) =
            table.accept_keep_alive(&channel(1), &keep_alive(4, 1, None), 0)
        else {
            panic!("keep-alive rejected");
        };
        assert!(record.proxy);
        assert!(!record.connected);
    }

    #[test]
    fn test_touch_reports_first_contact_only() {
        let mut table = PeerTable::new();
        let ch = channel(1);
        assert!(table.touch(&ch, peer(3), 10).is_some());
        assert!(table.touch(&ch, peer(3), 20).is_none());
        assert_eq!(table.get(&peer(3)).unwrap().last_seen, 20);
        assert!(table.touch(&channel(2), peer(3), 30).is_some());
    }

    #[test]
    fn test_leave_channel_disconnects() {
        let mut table = PeerTable::new();
        let ch = channel(1);
        table.sync_connected(&ch, &[peer(1), peer(2)], 0);
        let lost = table.leave_channel(&ch);
        assert_eq!(lost.len(), 2);
        assert_eq!(table.connected_count(), 0);
        assert!(table.connected(&ch).is_empty());

        table.clear();
        assert!(table.is_empty());
    }
}
