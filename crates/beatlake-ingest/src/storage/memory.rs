//! In-process snapshot store for dry runs and tests

use super::{calculate_sha256, codec, SaveOutcome, SnapshotStore};
use crate::error::StorageError;
use async_trait::async_trait;
use beatlake_common::Snapshot;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

/// Keeps encoded Parquet blobs in memory.
///
/// Snapshots go through the same codec as the S3 store so a dry run sees
/// exactly what a real run would read back. Clones share state.
#[derive(Clone, Default)]
pub struct MemorySnapshotStore {
    blobs: Arc<RwLock<HashMap<String, Bytes>>>,
    writes: Arc<AtomicUsize>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of blobs actually written
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.blobs
            .read()
            .map(|blobs| blobs.contains_key(name))
            .unwrap_or(false)
    }

    /// Names of stored snapshots, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .blobs
            .read()
            .map(|blobs| blobs.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    fn poisoned(name: &str) -> StorageError {
        StorageError::backend(name, "memory store lock poisoned")
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn load(&self, name: &str) -> Result<Snapshot, StorageError> {
        let blob = self
            .blobs
            .read()
            .map_err(|_| Self::poisoned(name))?
            .get(name)
            .cloned();

        match blob {
            Some(data) => codec::decode(name, data),
            None => Ok(Snapshot::empty()),
        }
    }

    async fn save(&self, name: &str, snapshot: &Snapshot) -> Result<SaveOutcome, StorageError> {
        if snapshot.is_empty() {
            warn!(dataset = %name, "Skipping upload of empty snapshot");
            return Ok(SaveOutcome::SkippedEmpty);
        }

        let data = codec::encode(name, snapshot)?;
        let checksum = calculate_sha256(&data);
        let bytes = data.len();

        self.blobs
            .write()
            .map_err(|_| Self::poisoned(name))?
            .insert(name.to_string(), Bytes::from(data));
        self.writes.fetch_add(1, Ordering::SeqCst);

        debug!(dataset = %name, bytes, "Stored snapshot in memory");
        Ok(SaveOutcome::Written {
            key: name.to_string(),
            bytes,
            checksum,
        })
    }
}
