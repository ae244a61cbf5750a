/*
    object_store.rs - the local value storage boundary.

    Responsibilities:
    spec.md §6 treats the actual object store (persistence format, compaction,
    encoding) as an external collaborator; the DHT only needs enough of an
    interface to decide whether a stored value is newer than a candidate for
    read-repair. This module defines that trait and an in-memory double.
*/

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::DhtResult;
use crate::key::RingKey;

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectRecord {
    pub data: Vec<u8>,
    pub block_number: u64,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, key: RingKey, record: ObjectRecord) -> DhtResult<()>;

    async fn get(&self, key: &RingKey) -> DhtResult<Option<ObjectRecord>>;

    /// All keys in the half-open ring arc `[start, end)`, for redistribution scans.
    async fn range(&self, start: &RingKey, end: &RingKey) -> DhtResult<Vec<(RingKey, ObjectRecord)>>;

    /// The block number a raw payload decodes to, without materializing the full
    /// record, used to compare candidates during read-repair.
    fn decode_block_number(&self, data: &[u8]) -> DhtResult<u64>;
}

#[derive(Clone, Default)]
pub struct InMemoryObjectStore {
    records: Arc<RwLock<HashMap<RingKey, ObjectRecord>>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn put(&self, key: RingKey, record: ObjectRecord) -> DhtResult<()> {
        self.records.write().await.insert(key, record);
        Ok(())
    }

    async fn get(&self, key: &RingKey) -> DhtResult<Option<ObjectRecord>> {
        Ok(self.records.read().await.get(key).cloned())
    }

    async fn range(&self, start: &RingKey, end: &RingKey) -> DhtResult<Vec<(RingKey, ObjectRecord)>> {
        let records = self.records.read().await;
        Ok(records
            .iter()
            .filter(|(key, _)| key.in_arc(start, end))
            .map(|(key, record)| (*key, record.clone()))
            .collect())
    }

    fn decode_block_number(&self, data: &[u8]) -> DhtResult<u64> {
        if data.len() < 8 {
            return Err(crate::error::DhtError::Storage("record too short to decode block number".into()));
        }
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&data[..8]);
        Ok(u64::from_be_bytes(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(byte: u8) -> RingKey {
        RingKey::from_bytes([byte; 32])
    }

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let store = InMemoryObjectStore::new();
        let record = ObjectRecord { data: vec![1, 2, 3], block_number: 5 };
        store.put(key(1), record.clone()).await.unwrap();
        assert_eq!(store.get(&key(1)).await.unwrap(), Some(record));
    }

    #[tokio::test]
    async fn get_missing_key_returns_none() {
        let store = InMemoryObjectStore::new();
        assert_eq!(store.get(&key(9)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn range_respects_arc_membership() {
        let store = InMemoryObjectStore::new();
        store.put(key(10), ObjectRecord { data: vec![], block_number: 1 }).await.unwrap();
        store.put(key(200), ObjectRecord { data: vec![], block_number: 1 }).await.unwrap();
        let results = store.range(&key(5), &key(20)).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0, key(10));
    }

    #[test]
    fn decode_block_number_rejects_short_payload() {
        let store = InMemoryObjectStore::new();
        assert!(store.decode_block_number(&[1, 2, 3]).is_err());
    }

    #[test]
    fn decode_block_number_reads_big_endian_prefix() {
        let store = InMemoryObjectStore::new();
        let mut data = 42u64.to_be_bytes().to_vec();
        data.extend_from_slice(b"payload");
        assert_eq!(store.decode_block_number(&data).unwrap(), 42);
    }
}
