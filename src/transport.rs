/*
    transport.rs - the peer wire boundary.

    Responsibilities:
    Everything below `PeerTransport` (dialing, framing, onion routing, NAT traversal)
    is an external collaborator per spec.md §1/§6 and is intentionally not implemented
    here; this module only defines the trait the DHT components call through, plus an
    in-memory double used by tests and by `tests/scenarios.rs` to wire up multi-node
    simulations without a real network.

    Inputs: a destination peer descriptor and an RPC payload.
    Outputs: the RPC's typed response, or a `DhtError::PeerUnreachable`/`Transport`.
*/

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::DhtResult;
use crate::key::RingKey;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerDescriptor {
    pub id: RingKey,
    pub address: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredValue {
    pub data: Vec<u8>,
    pub block_number: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FindValueResult {
    Found(StoredValue),
    NotFound(Vec<PeerDescriptor>),
}

#[async_trait]
pub trait PeerTransport: Send + Sync {
    async fn find_node(&self, peer: &PeerDescriptor, key: RingKey) -> DhtResult<Vec<PeerDescriptor>>;

    async fn find_value(&self, peer: &PeerDescriptor, key: RingKey) -> DhtResult<FindValueResult>;

    /// STORE is a cast (fire-and-forget per spec.md §4.5): the returned `DhtResult`
    /// reflects only whether the local transport accepted the send, not delivery.
    async fn store(&self, peer: &PeerDescriptor, key: RingKey, value: StoredValue) -> DhtResult<()>;

    async fn ping(&self, peer: &PeerDescriptor) -> DhtResult<()>;
}

/// An in-process transport double that routes calls directly to other registered
/// nodes' in-memory state, for tests and scenario simulations.
#[derive(Clone, Default)]
pub struct InMemoryTransport {
    nodes: Arc<Mutex<HashMap<RingKey, InMemoryNodeState>>>,
}

#[derive(Clone, Default)]
struct InMemoryNodeState {
    unreachable: bool,
    known_peers: Vec<PeerDescriptor>,
    values: HashMap<RingKey, StoredValue>,
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, id: RingKey) {
        self.nodes.lock().await.entry(id).or_default();
    }

    pub async fn set_unreachable(&self, id: RingKey, unreachable: bool) {
        self.nodes.lock().await.entry(id).or_default().unreachable = unreachable;
    }

    pub async fn set_known_peers(&self, id: RingKey, peers: Vec<PeerDescriptor>) {
        self.nodes.lock().await.entry(id).or_default().known_peers = peers;
    }

    pub async fn seed_value(&self, id: RingKey, key: RingKey, value: StoredValue) {
        self.nodes.lock().await.entry(id).or_default().values.insert(key, value);
    }

    pub async fn stored_value(&self, id: RingKey, key: &RingKey) -> Option<StoredValue> {
        self.nodes.lock().await.get(&id)?.values.get(key).cloned()
    }
}

#[async_trait]
impl PeerTransport for InMemoryTransport {
    async fn find_node(&self, peer: &PeerDescriptor, _key: RingKey) -> DhtResult<Vec<PeerDescriptor>> {
        let nodes = self.nodes.lock().await;
        let state = nodes
            .get(&peer.id)
            .ok_or(crate::error::DhtError::PeerUnreachable(peer.id))?;
        if state.unreachable {
            return Err(crate::error::DhtError::PeerUnreachable(peer.id));
        }
        Ok(state.known_peers.clone())
    }

    async fn find_value(&self, peer: &PeerDescriptor, key: RingKey) -> DhtResult<FindValueResult> {
        let nodes = self.nodes.lock().await;
        let state = nodes
            .get(&peer.id)
            .ok_or(crate::error::DhtError::PeerUnreachable(peer.id))?;
        if state.unreachable {
            return Err(crate::error::DhtError::PeerUnreachable(peer.id));
        }
        match state.values.get(&key) {
            Some(value) => Ok(FindValueResult::Found(value.clone())),
            None => Ok(FindValueResult::NotFound(state.known_peers.clone())),
        }
    }

    async fn store(&self, peer: &PeerDescriptor, key: RingKey, value: StoredValue) -> DhtResult<()> {
        let mut nodes = self.nodes.lock().await;
        let state = nodes
            .get_mut(&peer.id)
            .ok_or(crate::error::DhtError::PeerUnreachable(peer.id))?;
        if state.unreachable {
            return Err(crate::error::DhtError::PeerUnreachable(peer.id));
        }
        state.values.insert(key, value);
        Ok(())
    }

    async fn ping(&self, peer: &PeerDescriptor) -> DhtResult<()> {
        let nodes = self.nodes.lock().await;
        let state = nodes
            .get(&peer.id)
            .ok_or(crate::error::DhtError::PeerUnreachable(peer.id))?;
        if state.unreachable {
            Err(crate::error::DhtError::PeerUnreachable(peer.id))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(byte: u8) -> RingKey {
        RingKey::from_bytes([byte; 32])
    }

    #[tokio::test]
    async fn ping_fails_for_unregistered_peer() {
        let transport = InMemoryTransport::new();
        let peer = PeerDescriptor { id: id(1), address: "a".into() };
        assert!(transport.ping(&peer).await.is_err());
    }

    #[tokio::test]
    async fn store_then_find_value_round_trips() {
        let transport = InMemoryTransport::new();
        transport.register(id(1)).await;
        let peer = PeerDescriptor { id: id(1), address: "a".into() };
        let value = StoredValue { data: vec![1, 2, 3], block_number: 7 };
        transport.store(&peer, id(42), value.clone()).await.unwrap();

        match transport.find_value(&peer, id(42)).await.unwrap() {
            FindValueResult::Found(found) => assert_eq!(found, value),
            FindValueResult::NotFound(_) => panic!("expected value"),
        }
    }

    #[tokio::test]
    async fn unreachable_peer_errors_on_every_call() {
        let transport = InMemoryTransport::new();
        transport.register(id(1)).await;
        transport.set_unreachable(id(1), true).await;
        let peer = PeerDescriptor { id: id(1), address: "a".into() };
        assert!(transport.ping(&peer).await.is_err());
        assert!(transport.find_node(&peer, id(2)).await.is_err());
    }
}
