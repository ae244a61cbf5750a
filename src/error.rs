/*
    error.rs - crate-wide error types for the DHT core.

    One variant per §7 error kind, plus wrapping variants for the external
    collaborators (Peer Transport, Object Store, configuration). No variant here is
    fatal to the process: callers log and continue, per spec.md §7's closing note that
    the DHT stays available in a degraded state while maintenance retries continue.
*/

use thiserror::Error;

use crate::key::RingKey;

#[derive(Debug, Error)]
pub enum DhtError {
    /// RPC deadline elapsed or the transport reported a failure.
    #[error("peer {0} unreachable")]
    PeerUnreachable(RingKey),

    /// Some, but not all, of the k store targets accepted a `store`.
    #[error("store fanout partially failed: {succeeded}/{attempted} replicas accepted")]
    PartialFanoutFailure { succeeded: usize, attempted: usize },

    /// `find_value` located neither a remote nor a local copy.
    #[error("value not found")]
    NotFound,

    /// Read-repair observed equal block numbers but divergent bytes.
    #[error("version conflict at equal block {block_number}: keeping remote")]
    StoreVersionConflict { block_number: u64 },

    /// A check-and-swap routing table update lost the race and must be retried.
    #[error("routing table swap rejected, will retry on next event")]
    RaceOnTableSwap,

    /// A persisted snapshot failed to decode on load.
    #[error("snapshot corrupt: {0}")]
    CorruptSnapshot(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("object store error: {0}")]
    Storage(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type DhtResult<T> = Result<T, DhtError>;
