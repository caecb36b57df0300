//! Source adapters
//!
//! A source knows its endpoints and its record shapes. The
//! [`Pipeline`](crate::pipeline::Pipeline) drives every source through the
//! same search, reconcile, fetch, merge and publish sequence.

pub mod deezer;
pub mod spotify;
pub mod youtube;

pub use deezer::{DeezerCharts, DeezerGenres};
pub use spotify::SpotifySource;
pub use youtube::YoutubeSource;

use crate::auth::Auth;
use crate::error::{ApiError, AuthError, ConfigError};
use crate::fetcher::PageQuery;
use async_trait::async_trait;
use beatlake_common::{NaturalKey, Record, Value};
use reqwest::Url;
use tracing::warn;

/// A persisted dataset and the field that identifies its records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatasetSpec {
    pub name: &'static str,
    pub key: &'static str,
}

/// The detail dataset of a source.
///
/// `reference_field` holds the discovered id a detail record was fetched
/// for. It equals `dataset.key` when each discovered id yields one detail
/// record, and differs when one id expands to many (an album to its tracks).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetailSpec {
    pub dataset: DatasetSpec,
    pub reference_field: &'static str,
    /// Discovered ids per detail request
    pub batch_size: usize,
}

#[async_trait]
pub trait SourceAdapter: Send + Sync {
    type Query: PageQuery;

    fn name(&self) -> &'static str;

    /// Pre-flight check of the source configuration
    fn validate(&self) -> Result<(), ConfigError>;

    async fn authenticate(&self) -> Result<Auth, AuthError>;

    fn search_dataset(&self) -> DatasetSpec;

    fn detail_dataset(&self) -> DetailSpec;

    fn sub_queries(&self) -> Vec<Self::Query>;

    fn page_size(&self) -> usize;

    /// Cap on records retrieved for one sub-query
    fn max_items(&self, query: &Self::Query) -> usize;

    /// Ids a search record points at for detail fetching
    fn discovered_keys(&self, record: &Record) -> Vec<NaturalKey>;

    /// Ids fetched in detail on every run
    fn seed_keys(&self) -> Vec<NaturalKey> {
        Vec::new()
    }

    fn detail_url(&self, keys: &[NaturalKey]) -> String;

    fn parse_details(
        &self,
        keys: &[NaturalKey],
        body: &serde_json::Value,
    ) -> Result<Vec<Record>, ApiError>;

    /// Search record fields copied onto the detail records fetched for the
    /// ids that record discovered. The last search record to discover an id
    /// supplies the values.
    fn inherited_fields(&self) -> &'static [&'static str] {
        &[]
    }

    /// Source-specific signal that the remaining quota is spent
    fn is_quota_error(&self, _err: &ApiError) -> bool {
        false
    }
}

/// Build `base/path?params`; `base` was validated as a URL at startup
pub(crate) fn endpoint(base: &str, path: &str, params: &[(&str, String)]) -> String {
    let joined = format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'));
    match Url::parse(&joined) {
        Ok(mut url) => {
            if !params.is_empty() {
                url.query_pairs_mut()
                    .extend_pairs(params.iter().map(|(k, v)| (*k, v.as_str())));
            }
            url.into()
        },
        Err(_) => joined,
    }
}

/// Replace the page-size parameter of a continuation URL so a page never
/// asks for more than the remaining budget
pub(crate) fn with_limit(next: &str, param: &str, limit: usize) -> String {
    let Ok(mut url) = Url::parse(next) else {
        return next.to_string();
    };
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != param)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    url.query_pairs_mut()
        .clear()
        .extend_pairs(pairs)
        .append_pair(param, &limit.to_string());
    url.into()
}

/// Cell at a JSON pointer, `Null` when absent
pub(crate) fn cell(item: &serde_json::Value, pointer: &str) -> Value {
    item.pointer(pointer).map(Value::from_json).unwrap_or_default()
}

/// Array at `pointer`; an absent array is an empty page, any other shape is a
/// decode error
pub(crate) fn items<'a>(
    body: &'a serde_json::Value,
    pointer: &str,
    url_hint: &str,
) -> Result<&'a [serde_json::Value], ApiError> {
    match body.pointer(pointer) {
        None | Some(serde_json::Value::Null) => Ok(&[]),
        Some(serde_json::Value::Array(items)) => Ok(items.as_slice()),
        Some(other) => Err(ApiError::decode(
            url_hint,
            format!("expected an array at '{}', found {}", pointer, json_kind(other)),
        )),
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

/// Drop records that cannot be keyed; the merge would reject them
pub(crate) fn keep_keyed(source: &str, key: &str, records: Vec<Record>) -> Vec<Record> {
    let before = records.len();
    let kept: Vec<Record> = records
        .into_iter()
        .filter(|r| r.natural_key(key).is_ok())
        .collect();
    if kept.len() < before {
        warn!(
            source,
            key,
            dropped = before - kept.len(),
            "Dropped API items without a usable key"
        );
    }
    kept
}

/// Deezer and Spotify continuation URLs
pub(crate) fn next_url(body: &serde_json::Value, pointer: &str) -> Option<String> {
    body.pointer(pointer)
        .and_then(serde_json::Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
