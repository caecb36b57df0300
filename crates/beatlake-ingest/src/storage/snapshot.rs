use super::{codec, Storage};
use crate::error::StorageError;
use async_trait::async_trait;
use beatlake_common::Snapshot;
use serde::Serialize;
use tracing::{info, instrument, warn};

pub const PARQUET_CONTENT_TYPE: &str = "application/vnd.apache.parquet";

/// Result of a [`SnapshotStore::save`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SaveOutcome {
    Written {
        key: String,
        bytes: usize,
        checksum: String,
    },
    /// Nothing to publish; the previous blob, if any, is untouched
    SkippedEmpty,
}

impl SaveOutcome {
    pub fn is_written(&self) -> bool {
        matches!(self, SaveOutcome::Written { .. })
    }
}

/// Named, whole-blob persistence of snapshots.
///
/// `load` of a name that was never saved yields an empty snapshot. `save`
/// overwrites unconditionally, except that an empty snapshot is never
/// written.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn load(&self, name: &str) -> Result<Snapshot, StorageError>;

    async fn save(&self, name: &str, snapshot: &Snapshot) -> Result<SaveOutcome, StorageError>;
}

/// Snapshots stored as Parquet objects in one bucket, keyed by name
#[derive(Clone)]
pub struct S3SnapshotStore {
    storage: Storage,
}

impl S3SnapshotStore {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }
}

#[async_trait]
impl SnapshotStore for S3SnapshotStore {
    #[instrument(skip(self))]
    async fn load(&self, name: &str) -> Result<Snapshot, StorageError> {
        match self.storage.download_optional(name).await? {
            Some(data) => {
                let snapshot = codec::decode(name, data)?;
                info!(records = snapshot.len(), "Loaded snapshot");
                Ok(snapshot)
            },
            None => {
                info!("No existing snapshot, starting empty");
                Ok(Snapshot::empty())
            },
        }
    }

    #[instrument(skip(self, snapshot), fields(records = snapshot.len()))]
    async fn save(&self, name: &str, snapshot: &Snapshot) -> Result<SaveOutcome, StorageError> {
        if snapshot.is_empty() {
            warn!(dataset = %name, "Skipping upload of empty snapshot");
            return Ok(SaveOutcome::SkippedEmpty);
        }

        let data = codec::encode(name, snapshot)?;
        let result = self
            .storage
            .upload(name, data, Some(PARQUET_CONTENT_TYPE))
            .await?;

        Ok(SaveOutcome::Written {
            key: result.key,
            bytes: result.size,
            checksum: result.checksum,
        })
    }
}
