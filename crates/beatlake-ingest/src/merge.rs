//! Incremental merge of fetched batches into persisted snapshots
//!
//! The merge is `existing ++ incoming` deduplicated by natural key. A key
//! keeps the position where it was first seen and the value of its last
//! occurrence, so fresh data replaces stale data without reordering the
//! snapshot.

use crate::error::{MergeError, MergeSide};
use beatlake_common::{Batch, NaturalKey, Record, Snapshot};
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, instrument};

fn collect_keys<'a>(
    records: impl Iterator<Item = &'a Record>,
    key: &str,
    side: MergeSide,
) -> Result<Vec<NaturalKey>, MergeError> {
    records
        .enumerate()
        .map(|(position, record)| {
            record
                .natural_key(key)
                .map_err(|e| MergeError::from_key_error(e, side, position))
        })
        .collect()
}

/// Every key must have the kind of the first one
fn check_key_kinds(
    existing: &[NaturalKey],
    incoming: &[NaturalKey],
    key: &str,
) -> Result<(), MergeError> {
    let sides = [(MergeSide::Existing, existing), (MergeSide::Incoming, incoming)];
    let Some(expected) = existing.first().or(incoming.first()).map(NaturalKey::kind) else {
        return Ok(());
    };
    for (side, keys) in sides {
        if let Some(position) = keys.iter().position(|k| k.kind() != expected) {
            return Err(MergeError::MixedKeyKinds {
                field: key.to_string(),
                expected,
                found: keys[position].kind(),
                side,
                position,
            });
        }
    }
    Ok(())
}

/// Merge `incoming` into `existing`, keyed on `key`.
///
/// Every record on both sides is validated before the result is assembled,
/// including that all keys share one kind. Neither input is modified.
#[instrument(skip(existing, incoming), fields(existing = existing.len(), incoming = incoming.len()))]
pub fn merge(existing: &Snapshot, incoming: &Batch, key: &str) -> Result<Snapshot, MergeError> {
    let existing_keys = collect_keys(existing.iter(), key, MergeSide::Existing)?;
    let incoming_keys = collect_keys(incoming.iter(), key, MergeSide::Incoming)?;
    check_key_kinds(&existing_keys, &incoming_keys, key)?;

    if incoming.is_empty() {
        return Ok(existing.clone());
    }

    let mut slots: HashMap<NaturalKey, usize> =
        HashMap::with_capacity(existing_keys.len() + incoming_keys.len());
    let mut merged: Vec<Record> = Vec::with_capacity(existing_keys.len() + incoming_keys.len());

    let rows = existing_keys
        .into_iter()
        .zip(existing.iter())
        .chain(incoming_keys.into_iter().zip(incoming.iter()));

    for (natural_key, record) in rows {
        match slots.get(&natural_key) {
            Some(&slot) => merged[slot] = record.clone(),
            None => {
                slots.insert(natural_key, merged.len());
                merged.push(record.clone());
            },
        }
    }

    debug!(merged = merged.len(), "Merged snapshot");
    Ok(Snapshot::new(merged))
}

/// Natural keys present under `field`; records without a usable key are ignored
pub fn key_set(snapshot: &Snapshot, field: &str) -> BTreeSet<NaturalKey> {
    snapshot
        .iter()
        .filter_map(|record| record.natural_key(field).ok())
        .collect()
}

/// Keys that were discovered but have no detail record yet
pub fn reconcile_missing(
    existing: &BTreeSet<NaturalKey>,
    discovered: &BTreeSet<NaturalKey>,
) -> BTreeSet<NaturalKey> {
    discovered.difference(existing).cloned().collect()
}
