//! Silver layer: text cleanup of the YouTube video snapshot

use crate::error::StorageError;
use crate::sources::youtube::VIDEOS_DATASET;
use crate::storage::{SaveOutcome, SnapshotStore};
use beatlake_common::{Record, Snapshot, Value};
use regex::Regex;
use std::sync::OnceLock;
use tracing::{info, instrument};

pub const CLEANED_VIDEOS_DATASET: &str = "youtube_videos_cleaned.parquet";

/// Free-text columns that are cleaned
pub const TEXT_COLUMNS: &[&str] = &["title", "description"];

struct Patterns {
    hashtag: Regex,
    disallowed: Regex,
    whitespace: Regex,
}

fn patterns() -> Option<&'static Patterns> {
    static PATTERNS: OnceLock<Option<Patterns>> = OnceLock::new();
    PATTERNS
        .get_or_init(|| {
            Some(Patterns {
                hashtag: Regex::new(r"#\w+").ok()?,
                disallowed: Regex::new(r"[^\w\s.,!?-]").ok()?,
                whitespace: Regex::new(r"\s+").ok()?,
            })
        })
        .as_ref()
}

/// Drop hashtags, then every character other than word characters,
/// whitespace and `.,!?-`, then collapse runs of whitespace
pub fn clean_text(text: &str) -> String {
    let Some(p) = patterns() else {
        return text.trim().to_string();
    };
    let text = p.hashtag.replace_all(text, "");
    let text = p.disallowed.replace_all(&text, "");
    p.whitespace.replace_all(&text, " ").trim().to_string()
}

fn clean_record(mut record: Record) -> Record {
    for column in TEXT_COLUMNS {
        if let Some(Value::Str(text)) = record.get(column) {
            let cleaned = clean_text(text);
            record.insert(*column, cleaned);
        }
    }
    record
}

pub fn clean_snapshot(snapshot: Snapshot) -> Snapshot {
    snapshot.into_records().into_iter().map(clean_record).collect()
}

/// Read the video snapshot, clean it, and publish the cleaned copy
#[instrument(skip(store))]
pub async fn clean_youtube_videos(store: &dyn SnapshotStore) -> Result<SaveOutcome, StorageError> {
    let videos = store.load(VIDEOS_DATASET.name).await?;
    info!(records = videos.len(), "Loaded raw YouTube videos");

    let cleaned = clean_snapshot(videos);
    let outcome = store.save(CLEANED_VIDEOS_DATASET, &cleaned).await?;
    info!(records = cleaned.len(), written = outcome.is_written(), "Cleaned YouTube videos");
    Ok(outcome)
}
