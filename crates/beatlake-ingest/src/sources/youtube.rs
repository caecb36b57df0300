//! YouTube Data API v3: genre searches and video statistics

use super::{cell, endpoint, items, keep_keyed, DatasetSpec, DetailSpec, SourceAdapter};
use crate::auth::Auth;
use crate::config::YoutubeConfig;
use crate::error::{ApiError, AuthError, ConfigError};
use crate::fetcher::{Page, PageQuery};
use async_trait::async_trait;
use beatlake_common::{NaturalKey, Record};
use regex::Regex;
use reqwest::StatusCode;
use std::sync::OnceLock;

pub const SEARCH_DATASET: DatasetSpec = DatasetSpec {
    name: "youtube_search.parquet",
    key: "video_id",
};

pub const VIDEOS_DATASET: DatasetSpec = DatasetSpec {
    name: "youtube_videos.parquet",
    key: "video_id",
};

/// search.list and videos.list both cap `maxResults` at 50
pub const PAGE_SIZE: usize = 50;
pub const VIDEOS_PER_REQUEST: usize = 50;

pub struct YoutubeSource {
    config: YoutubeConfig,
}

impl YoutubeSource {
    pub fn new(config: YoutubeConfig) -> Self {
        Self { config }
    }
}

/// One genre keyword search, most viewed first
pub struct GenreSearch {
    api_base: String,
    genre: String,
    region_code: String,
}

impl PageQuery for GenreSearch {
    fn label(&self) -> String {
        format!("youtube:{}", self.genre)
    }

    fn page_url(&self, token: Option<&str>, page_size: usize) -> String {
        let mut params = vec![
            ("part", "snippet".to_string()),
            ("q", self.genre.clone()),
            ("type", "video".to_string()),
            ("regionCode", self.region_code.clone()),
            ("maxResults", page_size.to_string()),
            ("order", "viewCount".to_string()),
        ];
        if let Some(token) = token {
            params.push(("pageToken", token.to_string()));
        }
        endpoint(&self.api_base, "search", &params)
    }

    fn parse_page(&self, body: &serde_json::Value) -> Result<Page, ApiError> {
        let records = items(body, "/items", &self.label())?
            .iter()
            .map(|item| {
                Record::new()
                    .with("video_id", cell(item, "/id/videoId"))
                    .with("title", cell(item, "/snippet/title"))
                    .with("channel_title", cell(item, "/snippet/channelTitle"))
                    .with("published_at", cell(item, "/snippet/publishedAt"))
                    .with("genre", self.genre.as_str())
            })
            .collect();

        Ok(Page {
            records: keep_keyed("youtube", SEARCH_DATASET.key, records),
            next: super::next_url(body, "/nextPageToken"),
        })
    }
}

fn duration_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(
                r"^P(?:(\d+)W)?(?:(\d+)D)?(?:T(?:(\d+)H)?(?:(\d+)M)?(?:(\d+(?:\.\d+)?)S)?)?$",
            )
            .ok()
        })
        .as_ref()
}

/// ISO-8601 duration (`PT1H2M3S`, `P1DT5M`) in seconds
pub fn parse_duration(raw: &str) -> Option<f64> {
    let caps = duration_pattern()?.captures(raw.trim())?;
    let part = |i: usize, scale: f64| -> f64 {
        caps.get(i)
            .and_then(|m| m.as_str().parse::<f64>().ok())
            .map_or(0.0, |v| v * scale)
    };
    Some(
        part(1, 604_800.0)
            + part(2, 86_400.0)
            + part(3, 3_600.0)
            + part(4, 60.0)
            + part(5, 1.0),
    )
}

/// Statistics arrive as decimal strings; absent counts are zero
fn count(item: &serde_json::Value, pointer: &str) -> i64 {
    match item.pointer(pointer) {
        Some(serde_json::Value::String(s)) => s.parse().unwrap_or(0),
        Some(serde_json::Value::Number(n)) => n.as_i64().unwrap_or(0),
        _ => 0,
    }
}

fn video_record(item: &serde_json::Value) -> Record {
    let views = count(item, "/statistics/viewCount");
    let likes = count(item, "/statistics/likeCount");
    let dislikes = count(item, "/statistics/dislikeCount");
    let favorites = count(item, "/statistics/favoriteCount");
    let comments = count(item, "/statistics/commentCount");
    let engagement = (likes + dislikes + favorites + comments) as f64 / views.max(1) as f64;

    let tags = item
        .pointer("/snippet/tags")
        .and_then(serde_json::Value::as_array)
        .map(|tags| {
            tags.iter()
                .filter_map(serde_json::Value::as_str)
                .collect::<Vec<_>>()
                .join(",")
        })
        .unwrap_or_default();

    let duration = item
        .pointer("/contentDetails/duration")
        .and_then(serde_json::Value::as_str)
        .and_then(parse_duration);

    Record::new()
        .with("video_id", cell(item, "/id"))
        .with("title", cell(item, "/snippet/title"))
        .with("description", cell(item, "/snippet/description"))
        .with("channel_id", cell(item, "/snippet/channelId"))
        .with("channel_title", cell(item, "/snippet/channelTitle"))
        .with("published_at", cell(item, "/snippet/publishedAt"))
        .with("duration_seconds", duration)
        .with("views", views)
        .with("likes", likes)
        .with("dislikes", dislikes)
        .with("favorite_count", favorites)
        .with("comment_count", comments)
        .with("engagement_rate", engagement)
        .with("tags", tags)
        .with("thumbnail_url", cell(item, "/snippet/thumbnails/maxres/url"))
}

#[async_trait]
impl SourceAdapter for YoutubeSource {
    type Query = GenreSearch;

    fn name(&self) -> &'static str {
        "youtube"
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.config.validate()
    }

    async fn authenticate(&self) -> Result<Auth, AuthError> {
        Ok(Auth::query_key("key", self.config.api_key.clone()))
    }

    fn search_dataset(&self) -> DatasetSpec {
        SEARCH_DATASET
    }

    fn detail_dataset(&self) -> DetailSpec {
        DetailSpec {
            dataset: VIDEOS_DATASET,
            reference_field: VIDEOS_DATASET.key,
            batch_size: VIDEOS_PER_REQUEST,
        }
    }

    fn sub_queries(&self) -> Vec<GenreSearch> {
        self.config
            .queries
            .iter()
            .map(|genre| GenreSearch {
                api_base: self.config.api_base.clone(),
                genre: genre.clone(),
                region_code: self.config.region_code.clone(),
            })
            .collect()
    }

    fn page_size(&self) -> usize {
        PAGE_SIZE
    }

    fn max_items(&self, _query: &GenreSearch) -> usize {
        self.config.max_results_per_query
    }

    fn discovered_keys(&self, record: &Record) -> Vec<NaturalKey> {
        record
            .natural_key(SEARCH_DATASET.key)
            .ok()
            .into_iter()
            .collect()
    }

    fn seed_keys(&self) -> Vec<NaturalKey> {
        self.config
            .seed_video_ids
            .iter()
            .map(|id| NaturalKey::from(id.as_str()))
            .collect()
    }

    fn detail_url(&self, keys: &[NaturalKey]) -> String {
        let ids = keys.iter().map(ToString::to_string).collect::<Vec<_>>().join(",");
        endpoint(
            &self.config.api_base,
            "videos",
            &[
                ("part", "snippet,contentDetails,statistics".to_string()),
                ("id", ids),
            ],
        )
    }

    fn parse_details(
        &self,
        _keys: &[NaturalKey],
        body: &serde_json::Value,
    ) -> Result<Vec<Record>, ApiError> {
        let records = items(body, "/items", "youtube:videos")?
            .iter()
            .map(video_record)
            .collect();
        Ok(keep_keyed("youtube", VIDEOS_DATASET.key, records))
    }

    /// Quota exhaustion is a 403 whose error reason is `quotaExceeded`
    fn is_quota_error(&self, err: &ApiError) -> bool {
        match err {
            ApiError::Http { status, body, .. } => {
                *status == StatusCode::FORBIDDEN && body.contains("quotaExceeded")
            },
            _ => false,
        }
    }
}
