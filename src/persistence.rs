/*
    persistence.rs - atomic on-disk snapshots of the routing table.

    Responsibilities:
    Periodically durable-writes the known peer set so a restarted node can warm
    start instead of bootstrapping from seeds alone. Writes go to a `.tmp` file,
    `sync_all`, then an atomic `rename` over the previous snapshot, the same
    write-then-rename discipline the store's `SnapshotManager` uses, so a crash
    mid-write never leaves a corrupt file where the real snapshot should be.
    Loading a corrupt or missing snapshot is non-fatal: the facade starts with an
    empty table plus whatever seeds are configured.

    Inputs: the current peer set (id, address) to persist, or a directory to load
    the most recent snapshot from.
    Outputs: a `Vec<PersistedPeer>` on load; `DhtError::CorruptSnapshot` only for a
    snapshot that exists but fails to deserialize.
*/

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::error::{DhtError, DhtResult};
use crate::key::RingKey;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PersistedPeer {
    pub id: RingKey,
    pub address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SnapshotFile {
    version: u32,
    peers: Vec<PersistedPeer>,
}

pub struct PersistenceManager {
    dir: PathBuf,
}

impl PersistenceManager {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        PersistenceManager { dir: dir.into() }
    }

    fn tmp_path(&self) -> PathBuf {
        self.dir.join("routing_table.bin.tmp")
    }

    fn snapshot_path(&self) -> PathBuf {
        self.dir.join("routing_table.bin")
    }

    pub async fn save(&self, peers: Vec<PersistedPeer>, version: u32) -> DhtResult<()> {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| DhtError::Storage(format!("failed to create snapshot dir: {e}")))?;

        let snapshot = SnapshotFile { version, peers };
        let bytes = bincode::serialize(&snapshot)
            .map_err(|e| DhtError::Storage(format!("failed to serialize snapshot: {e}")))?;

        let tmp = self.tmp_path();
        fs::write(&tmp, &bytes)
            .await
            .map_err(|e| DhtError::Storage(format!("failed to write snapshot tmp file: {e}")))?;

        fs::rename(&tmp, self.snapshot_path())
            .await
            .map_err(|e| DhtError::Storage(format!("failed to rename snapshot into place: {e}")))?;

        Ok(())
    }

    /// Returns an empty list if no snapshot exists yet (fresh node). Returns
    /// `CorruptSnapshot` only if a file exists but fails to parse.
    pub async fn load(&self) -> DhtResult<Vec<PersistedPeer>> {
        let path = self.snapshot_path();
        if !path_exists(&path).await {
            return Ok(Vec::new());
        }

        let bytes = fs::read(&path)
            .await
            .map_err(|e| DhtError::CorruptSnapshot(format!("failed to read snapshot: {e}")))?;

        let snapshot: SnapshotFile = bincode::deserialize(&bytes)
            .map_err(|e| DhtError::CorruptSnapshot(format!("failed to deserialize snapshot: {e}")))?;

        Ok(snapshot.peers)
    }
}

async fn path_exists(path: &Path) -> bool {
    fs::metadata(path).await.is_ok()
}
