/*
    cache.rs - C3: the bounded result cache fronting find_value lookups.

    Responsibilities:
    Caches the outcome of a completed lookup keyed by the looked-up `RingKey`, so a
    repeated find_value for a hot key doesn't re-walk the network. Capacity-bounded
    via an LRU (`hashlink::LruCache`, the same crate the router uses for its
    `seen_requests` dedup table), with a debounce window that limits how often a
    cache hit can trigger a background refresh of a potentially stale entry.

    Inputs: a key and the value/peer-set a lookup resolved it to.
    Outputs: cached hits; a `should_refresh` signal consumed by the facade to kick
    off a non-blocking re-lookup without serializing the caller behind it.
*/

use std::time::{Duration, Instant};

use hashlink::LruCache;

use crate::key::RingKey;
use crate::transport::{PeerDescriptor, StoredValue};

#[derive(Debug, Clone)]
struct CacheEntry {
    value: StoredValue,
    cached_at: Instant,
    last_refresh_triggered: Option<Instant>,
}

pub struct ResultCache {
    entries: LruCache<RingKey, CacheEntry>,
    /// A separate LRU for `find_nodes`' closest-peer-set results, keyed by the
    /// same target key, per spec.md §4.3. Kept apart from `entries` rather than
    /// sharing one map: a `find_value` and a `find_nodes` call for the same
    /// target key cache different result shapes, not the same verb.
    nodes: LruCache<RingKey, Vec<PeerDescriptor>>,
    refresh_debounce: Duration,
}

impl ResultCache {
    pub fn new(capacity: usize, refresh_debounce: Duration) -> Self {
        ResultCache { entries: LruCache::new(capacity), nodes: LruCache::new(capacity), refresh_debounce }
    }

    pub fn get(&mut self, key: &RingKey) -> Option<StoredValue> {
        let hit = self.entries.get(key).map(|e| e.value.clone());
        if hit.is_some() {
            metrics::counter!("dht.cache.hit").increment(1);
        } else {
            metrics::counter!("dht.cache.miss").increment(1);
        }
        hit
    }

    pub fn insert(&mut self, key: RingKey, value: StoredValue) {
        self.entries.insert(
            key,
            CacheEntry { value, cached_at: Instant::now(), last_refresh_triggered: None },
        );
    }

    pub fn remove(&mut self, key: &RingKey) {
        self.entries.remove(key);
    }

    pub fn get_nodes(&mut self, key: &RingKey) -> Option<Vec<PeerDescriptor>> {
        let hit = self.nodes.get(key).cloned();
        if hit.is_some() {
            metrics::counter!("dht.cache.nodes.hit").increment(1);
        } else {
            metrics::counter!("dht.cache.nodes.miss").increment(1);
        }
        hit
    }

    pub fn insert_nodes(&mut self, key: RingKey, peers: Vec<PeerDescriptor>) {
        self.nodes.insert(key, peers);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether a cached hit for `key` should trigger a background refresh right now.
    /// Debounced so a hot key doesn't spawn a re-lookup on every single read.
    pub fn should_refresh(&mut self, key: &RingKey) -> bool {
        let debounce = self.refresh_debounce;
        match self.entries.get_mut(key) {
            Some(entry) => {
                let now = Instant::now();
                let due = match entry.last_refresh_triggered {
                    Some(last) => now.duration_since(last) >= debounce,
                    None => true,
                };
                if due {
                    entry.last_refresh_triggered = Some(now);
                }
                due
            }
            None => false,
        }
    }
}
