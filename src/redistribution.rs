/*
    redistribution.rs - C5: keeps stored objects near the peers responsible for them
    as the ring membership changes.

    Responsibilities:
    On peer arrival, scans the arc between the new peer and its ring neighbors
    (bounded by the ring midpoints, per spec.md §4.5) and casts STORE for objects
    that now belong closer to the arriving peer. On departure, the same scan runs
    against the departed peer's former neighbors so the objects it was holding get
    a cast to whoever is now closest. Debounced per affected peer so a flapping
    connection doesn't trigger a redistribution scan on every reconnect. Arcs that
    wrap past the top of the keyspace are split into two sub-scans, since the
    underlying store's range query only understands a non-wrapping `[start, end)`.

    Inputs: a peer arrival/departure event plus that peer's ring neighbors.
    Outputs: a count of STORE casts issued, for `dht.redistribution.casts`.
*/

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::warn;

use crate::config::DhtConfig;
use crate::error::DhtResult;
use crate::key::RingKey;
use crate::object_store::ObjectStore;
use crate::transport::{PeerDescriptor, PeerTransport, StoredValue};

pub struct RedistributionEngine<T: PeerTransport, O: ObjectStore> {
    transport: Arc<T>,
    store: Arc<O>,
    debounce: Duration,
    last_triggered: Mutex<HashMap<RingKey, Instant>>,
}

impl<T: PeerTransport, O: ObjectStore> RedistributionEngine<T, O> {
    pub fn new(transport: Arc<T>, store: Arc<O>, config: &DhtConfig) -> Self {
        RedistributionEngine {
            transport,
            store,
            debounce: config.redistribution_debounce,
            last_triggered: Mutex::new(HashMap::new()),
        }
    }

    /// Redistributes objects toward an arriving peer, bounded by the midpoints to
    /// its ring predecessor and successor. Returns `0` without scanning if the
    /// peer was debounced.
    pub async fn on_peer_arrival(
        &self,
        arriving: &PeerDescriptor,
        predecessor: &RingKey,
        successor: &RingKey,
    ) -> DhtResult<usize> {
        if !self.should_trigger(arriving.id).await {
            return Ok(0);
        }

        let start = predecessor.midpoint(&arriving.id);
        let end = arriving.id.midpoint(successor);
        let records = self.scan_arc(&start, &end).await?;

        let mut casts = 0;
        for (key, record) in records {
            if self
                .transport
                .store(arriving, key, StoredValue { data: record.data, block_number: record.block_number })
                .await
                .is_ok()
            {
                casts += 1;
            } else {
                warn!(peer = %arriving.id, key = %key, "redistribution cast failed");
            }
        }
        metrics::counter!("dht.redistribution.casts").increment(casts as u64);
        Ok(casts)
    }

    /// Redistributes the objects a departed peer was responsible for to its
    /// former ring neighbors.
    pub async fn on_peer_departure(
        &self,
        departed: &RingKey,
        predecessor: &RingKey,
        successor_peer: &PeerDescriptor,
    ) -> DhtResult<usize> {
        if !self.should_trigger(*departed).await {
            return Ok(0);
        }

        let start = predecessor.midpoint(departed);
        let end = departed.midpoint(&successor_peer.id);
        let records = self.scan_arc(&start, &end).await?;

        let mut casts = 0;
        for (key, record) in records {
            if self
                .transport
                .store(
                    successor_peer,
                    key,
                    StoredValue { data: record.data, block_number: record.block_number },
                )
                .await
                .is_ok()
            {
                casts += 1;
            } else {
                warn!(peer = %successor_peer.id, key = %key, "redistribution cast failed");
            }
        }
        metrics::counter!("dht.redistribution.casts").increment(casts as u64);
        Ok(casts)
    }

    async fn should_trigger(&self, peer_id: RingKey) -> bool {
        let mut last_triggered = self.last_triggered.lock().await;
        let now = Instant::now();
        match last_triggered.get(&peer_id) {
            Some(last) if now.duration_since(*last) < self.debounce => false,
            _ => {
                last_triggered.insert(peer_id, now);
                true
            }
        }
    }

    async fn scan_arc(
        &self,
        start: &RingKey,
        end: &RingKey,
    ) -> DhtResult<Vec<(RingKey, crate::object_store::ObjectRecord)>> {
        if start.cmp(end) != Ordering::Greater {
            self.store.range(start, end).await
        } else {
            let mut head = self.store.range(start, &RingKey::MAX).await?;
            let mut tail = self.store.range(&RingKey::ZERO, end).await?;
            head.append(&mut tail);
            Ok(head)
        }
    }
}
