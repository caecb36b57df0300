//! Deezer public API: charts expanded to albums, genres expanded to artists'
//! top tracks
//!
//! Deezer needs no credentials. One discovered id (an album, an artist)
//! expands to many track rows, so detail records carry the id they were
//! fetched for and reconciliation runs on that field.

use super::{
    cell, endpoint, items, keep_keyed, next_url, with_limit, DatasetSpec, DetailSpec,
    SourceAdapter,
};
use crate::auth::Auth;
use crate::config::DeezerConfig;
use crate::error::{ApiError, AuthError, ConfigError};
use crate::fetcher::{Page, PageQuery};
use async_trait::async_trait;
use beatlake_common::{NaturalKey, Record, Value};

pub const CHARTS_DATASET: DatasetSpec = DatasetSpec {
    name: "deezer_charts.parquet",
    key: "id",
};

pub const ALBUMS_DATASET: DatasetSpec = DatasetSpec {
    name: "deezer_albums.parquet",
    key: "id",
};

pub const GENRE_ARTISTS_DATASET: DatasetSpec = DatasetSpec {
    name: "deezer_genre_artists.parquet",
    key: "id",
};

pub const GENRES_DATASET: DatasetSpec = DatasetSpec {
    name: "deezer_genres.parquet",
    key: "id",
};

pub const PAGE_SIZE: usize = 100;
pub const ARTIST_TOP_LIMIT: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Listing {
    ChartTracks,
    GenreArtists { genre_id: i64 },
}

/// An `index`/`limit` paginated Deezer listing
pub struct DeezerListing {
    api_base: String,
    listing: Listing,
}

impl DeezerListing {
    fn path(&self) -> String {
        match self.listing {
            Listing::ChartTracks => "chart/0/tracks".to_string(),
            Listing::GenreArtists { genre_id } => format!("genre/{}/artists", genre_id),
        }
    }

    fn record(&self, item: &serde_json::Value) -> Record {
        match self.listing {
            Listing::ChartTracks => track_record(item)
                .with("album_id", cell(item, "/album/id"))
                .with("position", cell(item, "/position")),
            Listing::GenreArtists { genre_id } => Record::new()
                .with("id", cell(item, "/id"))
                .with("name", cell(item, "/name"))
                .with("link", cell(item, "/link"))
                .with("tracklist", cell(item, "/tracklist"))
                .with("genre_id", genre_id),
        }
    }
}

impl PageQuery for DeezerListing {
    fn label(&self) -> String {
        format!("deezer:{}", self.path())
    }

    fn page_url(&self, token: Option<&str>, page_size: usize) -> String {
        match token {
            Some(next) => with_limit(next, "limit", page_size),
            None => endpoint(
                &self.api_base,
                &self.path(),
                &[("index", "0".to_string()), ("limit", page_size.to_string())],
            ),
        }
    }

    fn parse_page(&self, body: &serde_json::Value) -> Result<Page, ApiError> {
        check_error(body, &self.label())?;
        let records = items(body, "/data", &self.label())?
            .iter()
            .map(|item| self.record(item))
            .collect();
        Ok(Page {
            records: keep_keyed("deezer", "id", records),
            next: next_url(body, "/next"),
        })
    }
}

/// Deezer reports failures as a 200 with an `error` object
fn check_error(body: &serde_json::Value, label: &str) -> Result<(), ApiError> {
    match body.get("error") {
        Some(error) if !error.is_null() => Err(ApiError::decode(
            label,
            format!(
                "Deezer error {}: {}",
                error.get("code").map(|c| c.to_string()).unwrap_or_default(),
                error.get("message").and_then(|m| m.as_str()).unwrap_or("unknown")
            ),
        )),
        _ => Ok(()),
    }
}

fn track_record(item: &serde_json::Value) -> Record {
    Record::new()
        .with("id", cell(item, "/id"))
        .with("title", cell(item, "/title"))
        .with("artist", cell(item, "/artist/name"))
        .with("album", cell(item, "/album/title"))
        .with("link", cell(item, "/link"))
        .with("duration", cell(item, "/duration"))
}

/// Track rows of one expanded id, tagged with that id under `reference_field`
fn expanded_tracks(
    keys: &[NaturalKey],
    body: &serde_json::Value,
    reference_field: &str,
    label: &str,
) -> Result<Vec<Record>, ApiError> {
    check_error(body, label)?;
    let reference = keys.first().map(Value::from).unwrap_or_default();
    let records = items(body, "/data", label)?
        .iter()
        .map(|item| track_record(item).with(reference_field, reference.clone()))
        .collect();
    Ok(keep_keyed("deezer", "id", records))
}

fn first_key(keys: &[NaturalKey]) -> String {
    keys.first().map(ToString::to_string).unwrap_or_default()
}

/// Chart tracks, then the tracks of every album they appear on
pub struct DeezerCharts {
    config: DeezerConfig,
}

impl DeezerCharts {
    pub fn new(config: DeezerConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl SourceAdapter for DeezerCharts {
    type Query = DeezerListing;

    fn name(&self) -> &'static str {
        "deezer-charts"
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.config.validate()
    }

    async fn authenticate(&self) -> Result<Auth, AuthError> {
        Ok(Auth::Anonymous)
    }

    fn search_dataset(&self) -> DatasetSpec {
        CHARTS_DATASET
    }

    fn detail_dataset(&self) -> DetailSpec {
        DetailSpec {
            dataset: ALBUMS_DATASET,
            reference_field: "album_id",
            batch_size: 1,
        }
    }

    fn sub_queries(&self) -> Vec<DeezerListing> {
        vec![DeezerListing {
            api_base: self.config.api_base.clone(),
            listing: Listing::ChartTracks,
        }]
    }

    fn page_size(&self) -> usize {
        PAGE_SIZE
    }

    fn max_items(&self, _query: &DeezerListing) -> usize {
        self.config.max_results_per_query
    }

    fn discovered_keys(&self, record: &Record) -> Vec<NaturalKey> {
        record.natural_key("album_id").ok().into_iter().collect()
    }

    fn detail_url(&self, keys: &[NaturalKey]) -> String {
        endpoint(
            &self.config.api_base,
            &format!("album/{}/tracks", first_key(keys)),
            &[],
        )
    }

    fn parse_details(
        &self,
        keys: &[NaturalKey],
        body: &serde_json::Value,
    ) -> Result<Vec<Record>, ApiError> {
        expanded_tracks(keys, body, "album_id", "deezer:album-tracks")
    }
}

/// Artists of each configured genre, then each artist's top tracks
pub struct DeezerGenres {
    config: DeezerConfig,
}

impl DeezerGenres {
    pub fn new(config: DeezerConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl SourceAdapter for DeezerGenres {
    type Query = DeezerListing;

    fn name(&self) -> &'static str {
        "deezer-genres"
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.config.validate()?;
        if self.config.genre_ids.is_empty() {
            return Err(ConfigError::Missing("DEEZER_GENRE_IDS".to_string()));
        }
        Ok(())
    }

    async fn authenticate(&self) -> Result<Auth, AuthError> {
        Ok(Auth::Anonymous)
    }

    fn search_dataset(&self) -> DatasetSpec {
        GENRE_ARTISTS_DATASET
    }

    fn detail_dataset(&self) -> DetailSpec {
        DetailSpec {
            dataset: GENRES_DATASET,
            reference_field: "artist_id",
            batch_size: 1,
        }
    }

    fn sub_queries(&self) -> Vec<DeezerListing> {
        self.config
            .genre_ids
            .iter()
            .map(|&genre_id| DeezerListing {
                api_base: self.config.api_base.clone(),
                listing: Listing::GenreArtists { genre_id },
            })
            .collect()
    }

    fn page_size(&self) -> usize {
        PAGE_SIZE
    }

    fn max_items(&self, _query: &DeezerListing) -> usize {
        self.config.max_results_per_query
    }

    fn discovered_keys(&self, record: &Record) -> Vec<NaturalKey> {
        record
            .natural_key(GENRE_ARTISTS_DATASET.key)
            .ok()
            .into_iter()
            .collect()
    }

    fn detail_url(&self, keys: &[NaturalKey]) -> String {
        endpoint(
            &self.config.api_base,
            &format!("artist/{}/top", first_key(keys)),
            &[("limit", ARTIST_TOP_LIMIT.to_string())],
        )
    }

    fn parse_details(
        &self,
        keys: &[NaturalKey],
        body: &serde_json::Value,
    ) -> Result<Vec<Record>, ApiError> {
        expanded_tracks(keys, body, "artist_id", "deezer:artist-top")
    }

    /// Top tracks carry the genre their artist was listed under
    fn inherited_fields(&self) -> &'static [&'static str] {
        &["genre_id"]
    }
}
