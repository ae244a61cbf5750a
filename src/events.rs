//! Observable events emitted by the DHT components, mirroring the teacher's
//! `DhtEvent` channel pattern (`core_dht::events`) so a host application can
//! subscribe without polling internal state.

use crate::key::RingKey;

#[derive(Debug, Clone, PartialEq)]
pub enum DhtEvent {
    PeerDiscovered { id: RingKey },
    PeerEvicted { id: RingKey },
    ValueStored { key: RingKey, block_number: u64 },
    ReadRepaired { key: RingKey, block_number: u64 },
    LookupCompleted { key: RingKey, visited: usize },
    SnapshotWritten { peer_count: usize },
    SnapshotLoadFailed { reason: String },
}
