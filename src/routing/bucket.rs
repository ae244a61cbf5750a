//! A single k-bucket: a capacity-bounded set of peer records sharing the same
//! XOR highest-differing-bit distance from the local node (classic Kademlia
//! bucket placement, independent of the ring-distance ordering used elsewhere).

use std::time::{Duration, Instant};

use crate::key::RingKey;

#[derive(Debug, Clone)]
pub struct PeerRecord {
    pub id: RingKey,
    pub address: String,
    pub last_connected: Instant,
    pub failed_rpcs: u32,
}

impl PeerRecord {
    pub fn new(id: RingKey, address: String) -> Self {
        PeerRecord { id, address, last_connected: Instant::now(), failed_rpcs: 0 }
    }

    pub fn touch(&mut self) {
        self.last_connected = Instant::now();
        self.failed_rpcs = 0;
    }

    pub fn mark_failed(&mut self) {
        self.failed_rpcs += 1;
    }

    pub fn age(&self) -> Duration {
        self.last_connected.elapsed()
    }

    pub fn is_fresh(&self, freshness_threshold: Duration) -> bool {
        self.age() < freshness_threshold
    }
}

#[derive(Debug, Clone)]
pub struct KBucket {
    peers: Vec<PeerRecord>,
    capacity: usize,
}

impl KBucket {
    pub fn new(capacity: usize) -> Self {
        KBucket { peers: Vec::new(), capacity }
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.peers.len() >= self.capacity
    }

    pub fn get(&self, id: &RingKey) -> Option<&PeerRecord> {
        self.peers.iter().find(|p| &p.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PeerRecord> {
        self.peers.iter()
    }

    /// Inserts or refreshes a peer. If the bucket is full and `id` is not already
    /// present, applies the overflow policy: replace the least-fresh incumbent if
    /// it has gone stale past `freshness_threshold`, otherwise reject the newcomer
    /// (classic Kademlia "prefer long-lived peers" bias).
    pub fn insert(&mut self, record: PeerRecord, freshness_threshold: Duration) -> bool {
        if let Some(existing) = self.peers.iter_mut().find(|p| p.id == record.id) {
            existing.address = record.address;
            existing.touch();
            return true;
        }

        if !self.is_full() {
            self.peers.push(record);
            return true;
        }

        let stale_idx = self
            .peers
            .iter()
            .enumerate()
            .filter(|(_, p)| !p.is_fresh(freshness_threshold))
            .min_by_key(|(_, p)| p.last_connected)
            .map(|(idx, _)| idx);

        match stale_idx {
            Some(idx) => {
                self.peers[idx] = record;
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, id: &RingKey) -> Option<PeerRecord> {
        let idx = self.peers.iter().position(|p| &p.id == id)?;
        Some(self.peers.remove(idx))
    }

    pub fn touch(&mut self, id: &RingKey) -> bool {
        match self.peers.iter_mut().find(|p| &p.id == id) {
            Some(p) => {
                p.touch();
                true
            }
            None => false,
        }
    }

    pub fn mark_failed(&mut self, id: &RingKey) -> bool {
        match self.peers.iter_mut().find(|p| &p.id == id) {
            Some(p) => {
                p.mark_failed();
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(byte: u8) -> PeerRecord {
        PeerRecord::new(RingKey::from_bytes([byte; 32]), format!("127.0.0.1:{}", 9000 + byte as u16))
    }

    #[test]
    fn insert_under_capacity_succeeds() {
        let mut bucket = KBucket::new(2);
        assert!(bucket.insert(peer(1), Duration::from_secs(1800)));
        assert_eq!(bucket.len(), 1);
    }

    #[test]
    fn insert_existing_refreshes_instead_of_duplicating() {
        let mut bucket = KBucket::new(2);
        bucket.insert(peer(1), Duration::from_secs(1800));
        bucket.insert(peer(1), Duration::from_secs(1800));
        assert_eq!(bucket.len(), 1);
    }

    #[test]
    fn insert_over_capacity_rejected_when_incumbents_fresh() {
        let mut bucket = KBucket::new(1);
        bucket.insert(peer(1), Duration::from_secs(1800));
        assert!(!bucket.insert(peer(2), Duration::from_secs(1800)));
        assert_eq!(bucket.len(), 1);
        assert!(bucket.get(&RingKey::from_bytes([1; 32])).is_some());
    }

    #[test]
    fn insert_over_capacity_replaces_stale_incumbent() {
        let mut bucket = KBucket::new(1);
        bucket.insert(peer(1), Duration::from_secs(0));
        // freshness_threshold of 0 means the incumbent is immediately stale.
        assert!(bucket.insert(peer(2), Duration::from_secs(0)));
        assert!(bucket.get(&RingKey::from_bytes([2; 32])).is_some());
    }

    #[test]
    fn remove_deletes_entry() {
        let mut bucket = KBucket::new(2);
        bucket.insert(peer(1), Duration::from_secs(1800));
        assert!(bucket.remove(&RingKey::from_bytes([1; 32])).is_some());
        assert!(bucket.is_empty());
    }

    #[test]
    fn mark_failed_increments_counter() {
        let mut bucket = KBucket::new(2);
        bucket.insert(peer(1), Duration::from_secs(1800));
        bucket.mark_failed(&RingKey::from_bytes([1; 32]));
        assert_eq!(bucket.get(&RingKey::from_bytes([1; 32])).unwrap().failed_rpcs, 1);
    }
}
