//! Bounded in-memory artifact cache
//!
//! Budgeted by payload bytes rather than entry count: artifacts range
//! from a few hundred bytes to several megabytes, so an entry cap would
//! bound nothing useful. Eviction is least-recently-used; a hit
//! refreshes recency. Nothing persists across restarts.

use super::key::CacheKey;
use bytes::Bytes;
use lru::LruCache;
use std::sync::Mutex;
use tracing::debug;

/// Size-bounded LRU store of compressed artifacts
pub struct ArtifactCache {
    max_bytes: usize,
    inner: Mutex<Inner>,
}

struct Inner {
    entries: LruCache<CacheKey, Bytes>,
    total: usize,
}

impl ArtifactCache {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            max_bytes,
            inner: Mutex::new(Inner {
                entries: LruCache::unbounded(),
                total: 0,
            }),
        }
    }

    /// Look up an artifact; a hit refreshes its recency
    pub fn get(&self, key: &CacheKey) -> Option<Bytes> {
        let mut inner = self.inner.lock().unwrap();
        inner.entries.get(key).cloned()
    }

    /// Insert or replace an artifact, evicting least-recently-used
    /// entries until the budget holds.
    ///
    /// A single artifact larger than the whole budget is still accepted:
    /// it evicts everything else and sits alone until something replaces
    /// it. Refusing it would make the offending package unservable, which
    /// is worse than a one-entry cache.
    pub fn set(&self, key: CacheKey, bytes: Bytes) {
        let mut inner = self.inner.lock().unwrap();

        let added = bytes.len();
        if let Some(old) = inner.entries.put(key, bytes) {
            inner.total -= old.len();
        }
        inner.total += added;

        while inner.total > self.max_bytes && inner.entries.len() > 1 {
            if let Some((evicted_key, evicted)) = inner.entries.pop_lru() {
                inner.total -= evicted.len();
                debug!("cache evicted {} ({} bytes)", evicted_key, evicted.len());
            } else {
                break;
            }
        }
    }

    /// Number of cached artifacts
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total payload bytes currently held
    pub fn total_bytes(&self) -> usize {
        self.inner.lock().unwrap().total
    }

    /// Configured byte budget
    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Snapshot of `(key, size)` pairs, most recently used first
    pub fn entries(&self) -> Vec<(CacheKey, usize)> {
        let inner = self.inner.lock().unwrap();
        inner
            .entries
            .iter()
            .map(|(k, v)| (k.clone(), v.len()))
            .collect()
    }
}
