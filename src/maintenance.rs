/*
    maintenance.rs - C6: background upkeep for the routing table.

    Responsibilities:
    Runs three independently-ticking jobs for as long as the node is up: contact
    configured seeds so an isolated node keeps finding its way back onto the ring,
    evict peers that have gone stale or accumulated too many failed RPCs, and
    periodically snapshot the routing table to disk. Structured as a single
    `tokio::select!` loop over three `interval()`s, the same shape the
    replication manager uses for its republish/GC ticks.

    Inputs: the routing table to maintain, the configured seeds, and the
    persistence manager to snapshot through.
    Outputs: `DhtEvent`s on the shared event channel for each job's outcome.
*/

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use crate::config::DhtConfig;
use crate::events::DhtEvent;
use crate::object_store::ObjectStore;
use crate::persistence::{PersistedPeer, PersistenceManager};
use crate::redistribution::RedistributionEngine;
use crate::routing::RoutingTable;
use crate::transport::{PeerDescriptor, PeerTransport};

pub struct MaintenanceScheduler<T: PeerTransport, O: ObjectStore> {
    transport: Arc<T>,
    routing_table: Arc<Mutex<RoutingTable>>,
    persistence: Arc<PersistenceManager>,
    redistribution: Arc<RedistributionEngine<T, O>>,
    seeds: Vec<PeerDescriptor>,
    event_tx: mpsc::Sender<DhtEvent>,
    config: DhtConfig,
    snapshot_version: std::sync::atomic::AtomicU32,
}

impl<T: PeerTransport, O: ObjectStore> MaintenanceScheduler<T, O> {
    pub fn new(
        transport: Arc<T>,
        routing_table: Arc<Mutex<RoutingTable>>,
        persistence: Arc<PersistenceManager>,
        redistribution: Arc<RedistributionEngine<T, O>>,
        seeds: Vec<PeerDescriptor>,
        event_tx: mpsc::Sender<DhtEvent>,
        config: DhtConfig,
    ) -> Self {
        MaintenanceScheduler {
            transport,
            routing_table,
            persistence,
            redistribution,
            seeds,
            event_tx,
            config,
            snapshot_version: std::sync::atomic::AtomicU32::new(0),
        }
    }

    pub async fn run(self) {
        let mut seed_tick = tokio::time::interval(self.config.seed_contact_interval);
        let mut eviction_tick = tokio::time::interval(self.config.stale_eviction_interval);
        let mut snapshot_tick = tokio::time::interval(self.config.snapshot_interval);

        loop {
            tokio::select! {
                _ = seed_tick.tick() => {
                    self.contact_seeds().await;
                }
                _ = eviction_tick.tick() => {
                    self.evict_stale().await;
                }
                _ = snapshot_tick.tick() => {
                    if let Err(err) = self.snapshot().await {
                        warn!(error = %err, "routing table snapshot failed");
                    }
                }
            }
        }
    }

    pub async fn contact_seeds(&self) -> usize {
        let mut reached = 0;
        for seed in &self.seeds {
            match self.transport.ping(seed).await {
                Ok(()) => {
                    let mut table = self.routing_table.lock().await;
                    if table.insert(seed.id, seed.address.clone()).unwrap_or(false) {
                        let _ = self.event_tx.send(DhtEvent::PeerDiscovered { id: seed.id }).await;
                    }
                    reached += 1;
                }
                Err(_) => debug!(seed = %seed.id, "seed unreachable this tick"),
            }
        }
        reached
    }

    /// Evicts peers past the stale threshold and triggers departure
    /// redistribution (§4.5) for each, using the neighbors it had at the moment
    /// of eviction so the vacated arc is covered.
    pub async fn evict_stale(&self) -> usize {
        let departures = {
            let mut table = self.routing_table.lock().await;
            let stale_ids = table.stale_peer_ids(self.config.stale_threshold);
            let mut departures = Vec::new();
            for id in stale_ids {
                let predecessor = table.prev(&id).map(|p| p.id);
                let successor = table.next(&id).map(|p| p.address.clone()).zip(table.next(&id).map(|p| p.id));
                if let Some(record) = table.remove(&id) {
                    departures.push((record, predecessor, successor));
                }
            }
            departures
        };

        for (peer, predecessor, successor) in &departures {
            let _ = self.event_tx.send(DhtEvent::PeerEvicted { id: peer.id }).await;
            if let (Some(predecessor), Some((successor_addr, successor_id))) = (predecessor, successor) {
                let successor_peer =
                    PeerDescriptor { id: *successor_id, address: successor_addr.clone() };
                if let Err(err) = self.redistribution.on_peer_departure(&peer.id, predecessor, &successor_peer).await
                {
                    warn!(peer = %peer.id, error = %err, "departure redistribution failed");
                }
            }
        }
        departures.len()
    }

    pub async fn snapshot(&self) -> crate::error::DhtResult<()> {
        let peers: Vec<PersistedPeer> = {
            let table = self.routing_table.lock().await;
            table.all_peers().into_iter().map(|p| PersistedPeer { id: p.id, address: p.address }).collect()
        };
        let version = self.snapshot_version.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
        let count = peers.len();
        self.persistence.save(peers, version).await?;
        info!(peer_count = count, "routing table snapshot written");
        let _ = self.event_tx.send(DhtEvent::SnapshotWritten { peer_count: count }).await;
        Ok(())
    }

    /// Restores the routing table from the most recent snapshot, if any.
    /// Non-fatal on failure: emits `SnapshotLoadFailed` and leaves the table as-is.
    pub async fn restore(&self) {
        match self.persistence.load().await {
            Ok(peers) => {
                let mut table = self.routing_table.lock().await;
                for peer in peers {
                    let _ = table.insert(peer.id, peer.address);
                }
            }
            Err(err) => {
                warn!(error = %err, "failed to restore routing table snapshot");
                let _ = self.event_tx.send(DhtEvent::SnapshotLoadFailed { reason: err.to_string() }).await;
            }
        }
    }
}
