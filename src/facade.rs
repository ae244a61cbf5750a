/*
    facade.rs - C7: the DHT's public surface.

    Responsibilities:
    Composes every other component into the four operations a host application
    calls: `store` (replicate a value to the k ring-closest peers, storing
    locally too if the local node is among them), `find_value` (cache, else a
    network lookup reconciled against any local copy via read-repair),
    `find_nodes` (closest peers to a key), and `find_node_object` (resolve a
    specific peer id to its descriptor). Read-repair compares the winning
    value's block number against the local copy, propagates the winner to the
    nearest/second-nearest visited peers, and logs `StoreVersionConflict` on
    an equal-block-number byte mismatch, per spec.md §4.7/§9.

    Inputs: keys and values from the host application.
    Outputs: stored/found values, or the `DhtError` kinds listed in spec.md §7.
*/

use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::{mpsc, Mutex};
use tracing::{info, warn};

use crate::cache::ResultCache;
use crate::config::DhtConfig;
use crate::error::{DhtError, DhtResult};
use crate::events::DhtEvent;
use crate::identity::Identity;
use crate::key::RingKey;
use crate::lookup::{LookupEngine, LookupOutcome};
use crate::object_store::{ObjectRecord, ObjectStore};
use crate::routing::RoutingTable;
use crate::session::SessionManager;
use crate::transport::{PeerDescriptor, PeerTransport, StoredValue};

pub struct DhtFacade<T: PeerTransport, O: ObjectStore, I: Identity> {
    identity: Arc<I>,
    routing_table: Arc<Mutex<RoutingTable>>,
    lookup: LookupEngine<T>,
    cache: Mutex<ResultCache>,
    sessions: Arc<SessionManager>,
    transport: Arc<T>,
    store: Arc<O>,
    config: DhtConfig,
    event_tx: mpsc::Sender<DhtEvent>,
}

impl<T: PeerTransport, O: ObjectStore, I: Identity> DhtFacade<T, O, I> {
    pub fn new(
        identity: Arc<I>,
        routing_table: Arc<Mutex<RoutingTable>>,
        transport: Arc<T>,
        store: Arc<O>,
        sessions: Arc<SessionManager>,
        event_tx: mpsc::Sender<DhtEvent>,
        config: DhtConfig,
    ) -> Self {
        let lookup = LookupEngine::new(transport.clone(), &config);
        let cache = Mutex::new(ResultCache::new(config.cache_capacity, config.cache_refresh_debounce));
        DhtFacade { identity, routing_table, lookup, cache, sessions, transport, store, config, event_tx }
    }

    /// The routing table backing this facade, for handshake/maintenance wiring
    /// and for tests that need to inspect or pre-seed membership directly.
    pub fn routing_table(&self) -> &Arc<Mutex<RoutingTable>> {
        &self.routing_table
    }

    async fn seed_peers(&self, target: &RingKey) -> Vec<PeerDescriptor> {
        let table = self.routing_table.lock().await;
        table
            .nearest(target, self.config.alpha.max(self.config.k))
            .into_iter()
            .map(|p| PeerDescriptor { id: p.id, address: p.address })
            .collect()
    }

    /// Replicates `data` to the k peers ring-closest to `key`, storing locally
    /// too if the local node is itself among the k closest.
    pub async fn store(&self, key: RingKey, data: Vec<u8>, block_number: u64) -> DhtResult<usize> {
        let seeds = self.seed_peers(&key).await;
        let (mut targets, _visited) = self.lookup.find_nodes(key, seeds).await;
        targets.truncate(self.config.k);

        let local_id = self.identity.address_of();
        let local_is_responsible = targets.len() < self.config.k
            || targets.iter().any(|p| local_id.is_closer(&p.id, &key));

        let mut succeeded = 0;
        let attempted = targets.len() + if local_is_responsible { 1 } else { 0 };

        if local_is_responsible {
            self.store.put(key, ObjectRecord { data: data.clone(), block_number }).await?;
            succeeded += 1;
        }

        // STORE casts fan out in parallel per §4.7; a slow or backed-off peer
        // must not serialize delivery to the rest of the k targets.
        let results = join_all(targets.iter().map(|peer| {
            let sessions = self.sessions.clone();
            let transport = self.transport.clone();
            let peer_clone = peer.clone();
            let value = StoredValue { data: data.clone(), block_number };
            async move {
                let id = peer_clone.id;
                let result = sessions.call(id, move || async move { transport.store(&peer_clone, key, value).await }).await;
                (id, result)
            }
        }))
        .await;

        for (peer_id, result) in results {
            match result {
                Ok(()) => succeeded += 1,
                Err(err) => warn!(peer = %peer_id, error = %err, "store cast failed"),
            }
        }

        if attempted == 0 {
            return Err(DhtError::PartialFanoutFailure { succeeded: 0, attempted: 0 });
        }
        if succeeded == 0 {
            return Err(DhtError::PartialFanoutFailure { succeeded, attempted });
        }

        let _ = self.event_tx.send(DhtEvent::ValueStored { key, block_number }).await;
        Ok(succeeded)
    }

    /// Runs the network lookup, reconciles it against any local copy via
    /// read-repair, and returns the winning value. Per spec.md §4.7:
    /// 1. if the lookup found a value and a local copy exists, compare
    ///    `block_number`s and keep the newer one (ties keep the remote,
    ///    logged as `StoreVersionConflict` if the bytes actually differ),
    ///    casting the winner to the nearest visited peer when local wins;
    /// 2. regardless, cast the chosen value to the second-nearest visited
    ///    peer (opportunistic re-replication);
    /// 3. if the lookup found nothing but a local copy exists, cast it to
    ///    the two nearest visited peers and return it; otherwise `NotFound`.
    pub async fn find_value(&self, key: RingKey) -> DhtResult<Vec<u8>> {
        if let Some(cached) = self.cache.lock().await.get(&key) {
            if self.cache.lock().await.should_refresh(&key) {
                info!(key = %key, "triggering background cache refresh");
            }
            return Ok(cached.data);
        }

        let seeds = self.seed_peers(&key).await;
        let outcome = self.lookup.find_value(key, seeds).await;
        let local = self.store.get(&key).await?;

        let winner = match outcome {
            LookupOutcome::Value { value: remote, visited, .. } => {
                let winner = self.reconcile(key, remote, local, &visited).await;
                self.cache.lock().await.insert(key, winner.clone());
                if let Some(peer) = visited.get(1) {
                    self.cast_store(key, peer.clone(), winner.clone()).await;
                }
                winner
            }
            LookupOutcome::NotFound { closest } => match local {
                Some(record) => {
                    let value = StoredValue { data: record.data, block_number: record.block_number };
                    for peer in closest.into_iter().take(self.config.k.min(2)) {
                        self.cast_store(key, peer, value.clone()).await;
                    }
                    self.cache.lock().await.insert(key, value.clone());
                    value
                }
                None => return Err(DhtError::NotFound),
            },
        };

        Ok(winner.data)
    }

    /// Compares a freshly looked-up remote value against any local copy and
    /// returns the winner, per §4.7 step 1. Overwrites the local copy when
    /// the remote wins; casts the local copy to the nearest visited peer
    /// when local wins; logs `StoreVersionConflict` on an equal-block-number
    /// byte mismatch (§7/§9's pinned tie-break: keep the remote value).
    async fn reconcile(
        &self,
        key: RingKey,
        remote: StoredValue,
        local: Option<ObjectRecord>,
        visited: &[PeerDescriptor],
    ) -> StoredValue {
        let Some(local) = local else {
            return remote;
        };

        match local.block_number.cmp(&remote.block_number) {
            std::cmp::Ordering::Greater => {
                let winner = StoredValue { data: local.data, block_number: local.block_number };
                if let Some(peer) = visited.first() {
                    self.cast_store(key, peer.clone(), winner.clone()).await;
                }
                winner
            }
            std::cmp::Ordering::Less => {
                if let Err(err) =
                    self.store.put(key, ObjectRecord { data: remote.data.clone(), block_number: remote.block_number }).await
                {
                    warn!(key = %key, error = %err, "failed to overwrite local copy with newer remote value");
                }
                remote
            }
            std::cmp::Ordering::Equal => {
                if local.data != remote.data {
                    let conflict = DhtError::StoreVersionConflict { block_number: remote.block_number };
                    warn!(key = %key, error = %conflict);
                }
                remote
            }
        }
    }

    async fn cast_store(&self, key: RingKey, peer: PeerDescriptor, value: StoredValue) {
        let transport = self.transport.clone();
        let block_number = value.block_number;
        let peer_clone = peer.clone();
        let result =
            self.sessions.call(peer.id, move || async move { transport.store(&peer_clone, key, value).await }).await;
        match result {
            Ok(()) => {
                let _ = self.event_tx.send(DhtEvent::ReadRepaired { key, block_number }).await;
            }
            Err(err) => warn!(peer = %peer.id, error = %err, "read-repair cast failed"),
        }
    }

    /// Returns the `k` ring-closest reachable peers to `target`, consulting
    /// the Result Cache first (§4.3) and, on a network lookup, feeding every
    /// freshly visited peer back into the Routing Table (§2/§4.3).
    pub async fn find_nodes(&self, target: RingKey) -> Vec<PeerDescriptor> {
        if let Some(cached) = self.cache.lock().await.get_nodes(&target) {
            return cached;
        }

        let seeds = self.seed_peers(&target).await;
        let (mut found, visited) = self.lookup.find_nodes(target, seeds).await;
        found.truncate(self.config.k);

        {
            let mut table = self.routing_table.lock().await;
            let local_id = *table.local_id();
            for peer in &visited {
                if peer.id != local_id {
                    let _ = table.insert(peer.id, peer.address.clone());
                }
            }
        }

        self.cache.lock().await.insert_nodes(target, found.clone());
        let _ = self.event_tx.send(DhtEvent::LookupCompleted { key: target, visited: visited.len() }).await;
        found
    }

    /// Resolves a specific node id to its descriptor, if reachable.
    pub async fn find_node_object(&self, id: RingKey) -> Option<PeerDescriptor> {
        if let Some(record) = self.routing_table.lock().await.get(&id) {
            return Some(PeerDescriptor { id: record.id, address: record.address.clone() });
        }
        let candidates = self.find_nodes(id).await;
        candidates.into_iter().find(|p| p.id == id)
    }
}
