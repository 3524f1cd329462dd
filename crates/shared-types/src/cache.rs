//! # Bounded Caches
//!
//! - [`LruCache`]: recency cache with a per-entry time-to-live, used for
//!   signature deduplication.
//! - [`IncrementalCache`]: round-keyed cache answering "latest entry at or
//!   before round N", used for in-memory checkpoints.

use std::collections::{BTreeMap, VecDeque};
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

struct Timed<V> {
    inserted: Instant,
    value: V,
}

/// LRU cache whose entries also expire after `ttl`.
///
/// Expired entries behave as absent and are dropped when touched.
pub struct LruCache<K: Hash + Eq, V> {
    inner: Mutex<lru::LruCache<K, Timed<V>>>,
    ttl: Duration,
}

impl<K: Hash + Eq, V: Clone> LruCache<K, V> {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(lru::LruCache::new(cap)),
            ttl,
        }
    }

    /// Insert or refresh `key`.
    pub fn insert(&self, key: K, value: V) {
        self.inner.lock().put(
            key,
            Timed {
                inserted: Instant::now(),
                value,
            },
        );
    }

    /// Whether a live entry exists. Promotes the entry on hit.
    pub fn contains(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let mut inner = self.inner.lock();
        let expired = match inner.get(key) {
            None => return None,
            Some(entry) if entry.inserted.elapsed() <= self.ttl => {
                return Some(entry.value.clone())
            }
            Some(_) => true,
        };
        if expired {
            inner.pop(key);
        }
        None
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().cap().get()
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }
}

/// Round-keyed cache with floor lookup.
///
/// Holds at most `capacity` entries; the oldest inserted entry is evicted
/// first. Not synchronised; owners wrap it in a lock.
pub struct IncrementalCache<V> {
    entries: BTreeMap<u64, V>,
    order: VecDeque<u64>,
    capacity: usize,
}

impl<V> IncrementalCache<V> {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: BTreeMap::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn insert(&mut self, key: u64, value: V) {
        if self.entries.insert(key, value).is_some() {
            self.order.retain(|k| *k != key);
        }
        self.order.push_back(key);
        while self.entries.len() > self.capacity {
            match self.order.pop_front() {
                Some(oldest) => {
                    self.entries.remove(&oldest);
                }
                None => break,
            }
        }
    }

    pub fn get(&self, key: u64) -> Option<&V> {
        self.entries.get(&key)
    }

    /// Entry with the greatest key `<= key`.
    pub fn floor(&self, key: u64) -> Option<(u64, &V)> {
        self.entries
            .range(..=key)
            .next_back()
            .map(|(k, v)| (*k, v))
    }

    pub fn latest(&self) -> Option<(u64, &V)> {
        self.entries.iter().next_back().map(|(k, v)| (*k, v))
    }

    /// Drop every entry with key `> key`.
    pub fn truncate_after(&mut self, key: u64) {
        let Some(first_dropped) = key.checked_add(1) else {
            return;
        };
        let dropped = self.entries.split_off(&first_dropped);
        if !dropped.is_empty() {
            self.order.retain(|k| *k <= key);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }
}
