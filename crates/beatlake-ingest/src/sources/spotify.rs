//! Spotify Web API: catalog search and track details

use super::{cell, endpoint, items, keep_keyed, next_url, with_limit, DatasetSpec, DetailSpec, SourceAdapter};
use crate::auth::{Auth, ClientCredentials, TokenProvider};
use crate::config::SpotifyConfig;
use crate::error::{ApiError, AuthError, ConfigError};
use crate::fetcher::{Page, PageQuery};
use async_trait::async_trait;
use beatlake_common::{NaturalKey, Record, Value};
use std::sync::Arc;

pub const SEARCH_DATASET: DatasetSpec = DatasetSpec {
    name: "spotify_search.parquet",
    key: "id",
};

pub const TRACKS_DATASET: DatasetSpec = DatasetSpec {
    name: "spotify_tracks.parquet",
    key: "id",
};

pub const PAGE_SIZE: usize = 50;
pub const TRACKS_PER_REQUEST: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchKind {
    Album,
    Playlist,
    Track,
}

impl SearchKind {
    pub const ALL: [SearchKind; 3] = [SearchKind::Album, SearchKind::Playlist, SearchKind::Track];

    /// Value of the `type` request parameter
    pub fn as_param(self) -> &'static str {
        match self {
            SearchKind::Album => "album",
            SearchKind::Playlist => "playlist",
            SearchKind::Track => "track",
        }
    }

    /// Response section holding this kind's results
    pub fn section(self) -> &'static str {
        match self {
            SearchKind::Album => "albums",
            SearchKind::Playlist => "playlists",
            SearchKind::Track => "tracks",
        }
    }
}

pub struct SpotifySource {
    config: SpotifyConfig,
    tokens: Arc<dyn TokenProvider>,
}

impl SpotifySource {
    /// Uses the client-credentials flow against the configured token URL
    pub fn new(config: SpotifyConfig, client: reqwest::Client) -> Self {
        let tokens = Arc::new(ClientCredentials::new(
            client,
            config.token_url.clone(),
            config.client_id.clone(),
            config.client_secret.clone(),
        ));
        Self::with_token_provider(config, tokens)
    }

    pub fn with_token_provider(config: SpotifyConfig, tokens: Arc<dyn TokenProvider>) -> Self {
        Self { config, tokens }
    }
}

/// One free-text query restricted to a single result type
pub struct CatalogSearch {
    api_base: String,
    query: String,
    kind: SearchKind,
    market: String,
}

impl PageQuery for CatalogSearch {
    fn label(&self) -> String {
        format!("spotify:{}:{}", self.kind.as_param(), self.query)
    }

    fn page_url(&self, token: Option<&str>, page_size: usize) -> String {
        match token {
            Some(next) => with_limit(next, "limit", page_size),
            None => endpoint(
                &self.api_base,
                "search",
                &[
                    ("q", self.query.clone()),
                    ("type", self.kind.as_param().to_string()),
                    ("market", self.market.clone()),
                    ("limit", page_size.to_string()),
                    ("offset", "0".to_string()),
                ],
            ),
        }
    }

    fn parse_page(&self, body: &serde_json::Value) -> Result<Page, ApiError> {
        let section = self.kind.section();
        let records = items(body, &format!("/{}/items", section), &self.label())?
            .iter()
            .map(|item| {
                let mut record = Record::new()
                    .with("type", section)
                    .with("id", cell(item, "/id"))
                    .with("name", cell(item, "/name"))
                    .with("release_date", cell(item, "/release_date"))
                    .with("total_tracks", cell(item, "/total_tracks"))
                    .with("popularity", cell(item, "/popularity"))
                    .with("query", self.query.as_str());
                match self.kind {
                    SearchKind::Playlist => {
                        record.insert("owner", cell(item, "/owner/display_name"));
                    },
                    SearchKind::Album | SearchKind::Track => {
                        record.insert("artist", cell(item, "/artists/0/name"));
                    },
                }
                record
            })
            .collect();

        Ok(Page {
            records: keep_keyed("spotify", SEARCH_DATASET.key, records),
            next: next_url(body, &format!("/{}/next", section)),
        })
    }
}

fn track_record(item: &serde_json::Value) -> Record {
    Record::new()
        .with("id", cell(item, "/id"))
        .with("name", cell(item, "/name"))
        .with("artist", cell(item, "/artists/0/name"))
        .with("album", cell(item, "/album/name"))
        .with("release_date", cell(item, "/album/release_date"))
        .with("duration_ms", cell(item, "/duration_ms"))
        .with("popularity", cell(item, "/popularity"))
        .with("preview_url", cell(item, "/preview_url"))
}

#[async_trait]
impl SourceAdapter for SpotifySource {
    type Query = CatalogSearch;

    fn name(&self) -> &'static str {
        "spotify"
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.config.validate()
    }

    async fn authenticate(&self) -> Result<Auth, AuthError> {
        Ok(Auth::Bearer(self.tokens.acquire().await?))
    }

    fn search_dataset(&self) -> DatasetSpec {
        SEARCH_DATASET
    }

    fn detail_dataset(&self) -> DetailSpec {
        DetailSpec {
            dataset: TRACKS_DATASET,
            reference_field: TRACKS_DATASET.key,
            batch_size: TRACKS_PER_REQUEST,
        }
    }

    fn sub_queries(&self) -> Vec<CatalogSearch> {
        self.config
            .queries
            .iter()
            .flat_map(|query| {
                SearchKind::ALL.into_iter().map(move |kind| CatalogSearch {
                    api_base: self.config.api_base.clone(),
                    query: query.clone(),
                    kind,
                    market: self.config.market.clone(),
                })
            })
            .collect()
    }

    fn page_size(&self) -> usize {
        PAGE_SIZE
    }

    fn max_items(&self, _query: &CatalogSearch) -> usize {
        self.config.max_results_per_query
    }

    /// Only track results have track details
    fn discovered_keys(&self, record: &Record) -> Vec<NaturalKey> {
        if record.get("type") != Some(&Value::from(SearchKind::Track.section())) {
            return Vec::new();
        }
        record.natural_key(SEARCH_DATASET.key).ok().into_iter().collect()
    }

    fn seed_keys(&self) -> Vec<NaturalKey> {
        self.config
            .seed_track_ids
            .iter()
            .map(|id| NaturalKey::from(id.as_str()))
            .collect()
    }

    fn detail_url(&self, keys: &[NaturalKey]) -> String {
        let ids = keys.iter().map(ToString::to_string).collect::<Vec<_>>().join(",");
        endpoint(
            &self.config.api_base,
            "tracks",
            &[("market", self.config.market.clone()), ("ids", ids)],
        )
    }

    fn parse_details(
        &self,
        _keys: &[NaturalKey],
        body: &serde_json::Value,
    ) -> Result<Vec<Record>, ApiError> {
        let records = items(body, "/tracks", "spotify:tracks")?
            .iter()
            .filter(|item| !item.is_null())
            .map(track_record)
            .collect();
        Ok(keep_keyed("spotify", TRACKS_DATASET.key, records))
    }
}
