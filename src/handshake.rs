/*
    handshake.rs - the three transport-to-DHT callbacks from spec.md §6.

    Responsibilities:
    The Peer Transport (out of scope, §1) calls back into the DHT at three
    points in a connection's life: when it first registers a peer (possibly
    before any RPC has succeeded), when that peer proves itself "stable" (at
    least `stable_message_count` messages over `stable_window`, §4.4), and when
    an outbound call to it fails. This module is the seam those callbacks land
    on: it upserts the Routing Table, seeds the Object Store with the peer's
    server descriptor under its address key (so `find_node_object` can resolve
    it later via a plain `find_value`), and triggers arrival-redistribution
    once a peer is stable enough to be trusted with a share of the ring.

    Inputs: a peer's node id and descriptor, from the transport.
    Outputs: none directly; routing table/session/object-store/redistribution
    side effects plus `DhtEvent`s on the shared channel.
*/

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info};

use crate::events::DhtEvent;
use crate::key::RingKey;
use crate::object_store::{ObjectRecord, ObjectStore};
use crate::redistribution::RedistributionEngine;
use crate::routing::RoutingTable;
use crate::session::SessionManager;
use crate::transport::{PeerDescriptor, PeerTransport};

pub struct HandshakeHandler<T: PeerTransport, O: ObjectStore> {
    routing_table: Arc<Mutex<RoutingTable>>,
    sessions: Arc<SessionManager>,
    redistribution: Arc<RedistributionEngine<T, O>>,
    store: Arc<O>,
    event_tx: mpsc::Sender<DhtEvent>,
}

impl<T: PeerTransport, O: ObjectStore> HandshakeHandler<T, O> {
    pub fn new(
        routing_table: Arc<Mutex<RoutingTable>>,
        sessions: Arc<SessionManager>,
        redistribution: Arc<RedistributionEngine<T, O>>,
        store: Arc<O>,
        event_tx: mpsc::Sender<DhtEvent>,
    ) -> Self {
        HandshakeHandler { routing_table, sessions, redistribution, store, event_tx }
    }

    /// Upserts the peer record and seeds its server descriptor into the Object
    /// Store under its own address key, per §6.
    pub async fn on_peer_registered(&self, node_id: RingKey, descriptor: PeerDescriptor) {
        let inserted = {
            let mut table = self.routing_table.lock().await;
            table.insert(node_id, descriptor.address.clone()).unwrap_or(false)
        };
        if inserted {
            let _ = self.event_tx.send(DhtEvent::PeerDiscovered { id: node_id }).await;
        }

        let mut payload = 0u64.to_be_bytes().to_vec();
        payload.extend_from_slice(descriptor.address.as_bytes());
        if let Err(err) = self.store.put(node_id, ObjectRecord { data: payload, block_number: 0 }).await {
            debug!(peer = %node_id, error = %err, "failed to seed server descriptor into object store");
        }
    }

    /// Resets retries to zero and triggers arrival-redistribution for the arc
    /// this now-stable peer is responsible for.
    pub async fn on_peer_stable(&self, node_id: RingKey) {
        self.sessions.mark_stable(node_id).await;

        let (predecessor, successor, address) = {
            let table = self.routing_table.lock().await;
            let predecessor = table.prev(&node_id).map(|p| p.id);
            let successor = table.next(&node_id).map(|p| p.id);
            let address = table.get(&node_id).map(|p| p.address.clone());
            (predecessor, successor, address)
        };

        let (Some(predecessor), Some(successor), Some(address)) = (predecessor, successor, address) else {
            debug!(peer = %node_id, "stable peer has no ring neighbors yet, skipping redistribution");
            return;
        };

        let arriving = PeerDescriptor { id: node_id, address };
        match self.redistribution.on_peer_arrival(&arriving, &predecessor, &successor).await {
            Ok(casts) if casts > 0 => info!(peer = %node_id, casts, "arrival redistribution complete"),
            Ok(_) => {}
            Err(err) => debug!(peer = %node_id, error = %err, "arrival redistribution failed"),
        }
    }

    /// Advances the peer's backoff state machine on an observed failure.
    pub async fn on_peer_failed(&self, node_id: RingKey) {
        self.sessions.mark_failed(node_id).await;
        self.routing_table.lock().await.mark_failed(&node_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DhtConfig;
    use crate::object_store::InMemoryObjectStore;
    use crate::session::SessionState;
    use crate::transport::InMemoryTransport;

    fn id(byte: u8) -> RingKey {
        RingKey::from_bytes([byte; 32])
    }

    async fn handler() -> (
        HandshakeHandler<InMemoryTransport, InMemoryObjectStore>,
        Arc<Mutex<RoutingTable>>,
        Arc<SessionManager>,
        Arc<InMemoryObjectStore>,
    ) {
        let config = DhtConfig::test_config();
        let table = Arc::new(Mutex::new(RoutingTable::new(id(0), &config)));
        let sessions = Arc::new(SessionManager::new(&config));
        let transport = Arc::new(InMemoryTransport::new());
        transport.register(id(0)).await;
        let store = Arc::new(InMemoryObjectStore::new());
        let redistribution = Arc::new(RedistributionEngine::new(transport, store.clone(), &config));
        let (tx, _rx) = mpsc::channel(16);
        let handler = HandshakeHandler::new(table.clone(), sessions.clone(), redistribution, store.clone(), tx);
        (handler, table, sessions, store)
    }

    #[tokio::test]
    async fn on_peer_registered_upserts_table_and_seeds_store() {
        let (handler, table, _sessions, store) = handler().await;
        let descriptor = PeerDescriptor { id: id(1), address: "127.0.0.1:9001".into() };
        handler.on_peer_registered(id(1), descriptor).await;

        assert!(table.lock().await.contains(&id(1)));
        assert!(store.get(&id(1)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn on_peer_stable_resets_backoff_even_with_no_neighbors() {
        let (handler, table, sessions, _store) = handler().await;
        table.lock().await.insert(id(1), "127.0.0.1:9001".into()).unwrap();
        handler.on_peer_failed(id(1)).await;
        assert!(matches!(sessions.state(&id(1)).await, SessionState::Unhealthy { .. }));

        handler.on_peer_stable(id(1)).await;
        assert_eq!(sessions.state(&id(1)).await, SessionState::Healthy);
    }

    #[tokio::test]
    async fn on_peer_failed_marks_table_and_session() {
        let (handler, table, sessions, _store) = handler().await;
        table.lock().await.insert(id(1), "127.0.0.1:9001".into()).unwrap();

        handler.on_peer_failed(id(1)).await;

        assert_eq!(table.lock().await.get(&id(1)).unwrap().failed_rpcs, 1);
        assert!(matches!(sessions.state(&id(1)).await, SessionState::Unhealthy { retries: 1, .. }));
    }
}
