//! Bounded LRU cache of `(value, version)` per key.

use std::num::NonZeroUsize;

use lru::LruCache;
use parking_lot::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedValue {
    pub value: Vec<u8>,
    pub version: i64,
}

struct Slots {
    entries: LruCache<String, CachedValue>,
    /// Bumped by every `clear`.
    epoch: u64,
}

/// Thread-safe LRU cache owned by one session.
///
/// A capacity of zero disables caching: every `get` misses and `set` is
/// dropped.
///
/// Fills that race with an invalidation go through [`ClientCache::epoch`]
/// and [`ClientCache::set_if_unchanged`]: take the epoch before the round
/// trip, and the fill is dropped if any `clear` ran in between.
pub struct ClientCache {
    capacity: usize,
    inner: Option<Mutex<Slots>>,
}

impl ClientCache {
    pub fn new(capacity: usize) -> Self {
        ClientCache {
            capacity,
            inner: NonZeroUsize::new(capacity).map(|c| {
                Mutex::new(Slots { entries: LruCache::new(c), epoch: 0 })
            }),
        }
    }

    /// Look up `key`, marking it most recently used on a hit.
    pub fn get(&self, key: &str) -> Option<CachedValue> {
        self.inner.as_ref()?.lock().entries.get(key).cloned()
    }

    /// Insert or refresh `key` as most recently used, evicting the least
    /// recently used entry when full.
    pub fn set(&self, key: &str, value: Vec<u8>, version: i64) {
        if let Some(inner) = &self.inner {
            inner.lock().entries.put(key.to_string(), CachedValue { value, version });
        }
    }

    pub fn epoch(&self) -> u64 {
        self.inner.as_ref().map(|inner| inner.lock().epoch).unwrap_or(0)
    }

    /// Like [`ClientCache::set`], but only if no `clear` has run since
    /// `epoch` was read. Returns whether the entry was stored.
    pub fn set_if_unchanged(&self, key: &str, value: Vec<u8>, version: i64, epoch: u64) -> bool {
        let Some(inner) = &self.inner else {
            return false;
        };
        let mut slots = inner.lock();
        if slots.epoch != epoch {
            return false;
        }
        slots.entries.put(key.to_string(), CachedValue { value, version });
        true
    }

    /// Drop `key` if present and invalidate fills still in flight.
    pub fn clear(&self, key: &str) {
        if let Some(inner) = &self.inner {
            let mut slots = inner.lock();
            slots.entries.pop(key);
            slots.epoch = slots.epoch.wrapping_add(1);
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner
            .as_ref()
            .map(|inner| inner.lock().entries.contains(key))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.inner.as_ref().map(|inner| inner.lock().entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }
}
