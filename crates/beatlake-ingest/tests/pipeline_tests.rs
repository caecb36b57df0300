//! End-to-end ingestion runs against mocked source APIs
//!
//! Every test drives a real [`Pipeline`] with a mock HTTP server standing in
//! for the source and an in-memory snapshot store standing in for MinIO.

use beatlake_common::logging::init_test_logging;
use beatlake_common::{NaturalKey, Value};
use beatlake_ingest::config::{DeezerConfig, SpotifyConfig, YoutubeConfig};
use beatlake_ingest::error::{AuthError, ConfigError, IngestError};
use beatlake_ingest::fetcher::{Fetcher, RetryPolicy};
use beatlake_ingest::merge::key_set;
use beatlake_ingest::pipeline::{Pipeline, RunState};
use beatlake_ingest::sources::{deezer, spotify, youtube};
use beatlake_ingest::sources::{
    DeezerCharts, DeezerGenres, SourceAdapter, SpotifySource, YoutubeSource,
};
use beatlake_ingest::storage::{MemorySnapshotStore, SaveOutcome, SnapshotStore};
use serde_json::json;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use wiremock::{
    matchers::{header, method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

fn fetcher() -> Fetcher {
    Fetcher::new(
        reqwest::Client::new(),
        RetryPolicy::new(2, Duration::from_millis(10)),
    )
}

fn pipeline<S: SourceAdapter>(source: S, store: &MemorySnapshotStore) -> Pipeline<S> {
    Pipeline::new(source, fetcher(), Arc::new(store.clone())).with_batch_pause(Duration::ZERO)
}

fn youtube_config(server: &MockServer) -> YoutubeConfig {
    YoutubeConfig {
        api_key: "test-key".to_string(),
        api_base: format!("{}/youtube/v3", server.uri()),
        queries: vec!["pop".to_string(), "rock".to_string()],
        max_results_per_query: 10,
        seed_video_ids: Vec::new(),
        ..YoutubeConfig::default()
    }
}

fn search_item(video_id: &str, title: &str) -> serde_json::Value {
    json!({
        "id": {"kind": "youtube#video", "videoId": video_id},
        "snippet": {"title": title, "channelTitle": "Beatlake", "publishedAt": "2024-01-01T00:00:00Z"}
    })
}

// ============================================================================
// Deezer Charts
// ============================================================================

async fn mount_deezer(server: &MockServer, album_expectation: u64) {
    Mock::given(method("GET"))
        .and(path("/chart/0/tracks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                {"id": 1, "title": "One", "position": 1, "album": {"id": 10, "title": "First"}, "artist": {"name": "A"}},
                {"id": 2, "title": "Two", "position": 2, "album": {"id": 10, "title": "First"}, "artist": {"name": "A"}},
                {"id": 3, "title": "Three", "position": 3, "album": {"id": 20, "title": "Second"}, "artist": {"name": "B"}}
            ],
            "total": 3
        })))
        .mount(server)
        .await;

    for (album, tracks) in [(10, vec![1, 2, 11]), (20, vec![3, 21])] {
        let data: Vec<_> = tracks
            .iter()
            .map(|id| json!({"id": id, "title": format!("Track {}", id), "duration": 180}))
            .collect();
        Mock::given(method("GET"))
            .and(path(format!("/album/{}/tracks", album)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": data })))
            .expect(album_expectation)
            .mount(server)
            .await;
    }
}

fn deezer_charts(server: &MockServer) -> DeezerCharts {
    DeezerCharts::new(DeezerConfig {
        api_base: server.uri(),
        ..DeezerConfig::default()
    })
}

#[tokio::test]
async fn test_first_run_publishes_search_and_details() {
    init_test_logging();
    let server = MockServer::start().await;
    mount_deezer(&server, 1).await;
    let store = MemorySnapshotStore::new();

    let report = pipeline(deezer_charts(&server), &store).run().await.unwrap();

    assert_eq!(report.state, RunState::Done);
    assert!(report.is_success());
    assert_eq!(report.searched(), 3);
    assert_eq!(report.discovered, 2);
    assert_eq!(report.missing, 2);
    assert_eq!(report.fetched, 5);
    assert!(report.published.iter().all(|p| p.outcome.is_written()));
    assert_eq!(store.writes(), 2);

    let albums = store.load(deezer::ALBUMS_DATASET.name).await.unwrap();
    assert_eq!(
        key_set(&albums, "album_id"),
        BTreeSet::from([NaturalKey::Int(10), NaturalKey::Int(20)])
    );
    let charts = store.load(deezer::CHARTS_DATASET.name).await.unwrap();
    assert_eq!(charts.len(), 3);
}

#[tokio::test]
async fn test_second_run_fetches_no_details() {
    init_test_logging();
    let server = MockServer::start().await;
    // Album tracks are requested by the first run only
    mount_deezer(&server, 1).await;
    let store = MemorySnapshotStore::new();

    pipeline(deezer_charts(&server), &store).run().await.unwrap();
    let before = store.load(deezer::ALBUMS_DATASET.name).await.unwrap();

    let report = pipeline(deezer_charts(&server), &store).run().await.unwrap();

    assert_eq!(report.discovered, 2);
    assert_eq!(report.missing, 0);
    assert_eq!(report.fetched, 0);
    let after = store.load(deezer::ALBUMS_DATASET.name).await.unwrap();
    assert_eq!(after, before);
}

#[tokio::test]
async fn test_failed_detail_request_is_skipped() {
    init_test_logging();
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/chart/0/tracks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                {"id": 1, "album": {"id": 10}},
                {"id": 2, "album": {"id": 20}}
            ]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/album/10/tracks"))
        .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/album/20/tracks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": [{"id": 2}]})))
        .expect(1)
        .mount(&server)
        .await;

    let store = MemorySnapshotStore::new();
    let report = pipeline(deezer_charts(&server), &store).run().await.unwrap();

    assert!(report.is_success());
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].phase, RunState::Fetching);
    assert_eq!(report.failures[0].status, Some(404));
    assert_eq!(report.fetched, 1);
    assert!(!report.rate_limited);
}

#[tokio::test]
async fn test_rate_limit_mid_fetch_publishes_fetched_details() {
    init_test_logging();
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/chart/0/tracks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                {"id": 1, "album": {"id": 10}},
                {"id": 2, "album": {"id": 20}},
                {"id": 3, "album": {"id": 30}}
            ]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/album/10/tracks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"id": 1, "title": "One"}, {"id": 11, "title": "Eleven"}]
        })))
        .expect(1)
        .mount(&server)
        .await;
    // Two attempts under the test policy, then the fetch loop stops
    Mock::given(method("GET"))
        .and(path("/album/20/tracks"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/album/30/tracks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": [{"id": 3}]})))
        .expect(0)
        .mount(&server)
        .await;

    let store = MemorySnapshotStore::new();
    let report = pipeline(deezer_charts(&server), &store).run().await.unwrap();

    assert!(report.is_success());
    assert!(report.state.is_terminal());
    assert!(report.rate_limited);
    assert_eq!(report.missing, 3);
    assert_eq!(report.fetched, 2);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].phase, RunState::Fetching);
    assert_eq!(report.failures[0].status, Some(429));

    let albums = store.load(deezer::ALBUMS_DATASET.name).await.unwrap();
    assert_eq!(
        key_set(&albums, "album_id"),
        BTreeSet::from([NaturalKey::Int(10)])
    );
    assert_eq!(store.load(deezer::CHARTS_DATASET.name).await.unwrap().len(), 3);
}

// ============================================================================
// Deezer Genres
// ============================================================================

async fn mount_genre_artists(server: &MockServer) {
    for (genre, artists) in [
        (132, json!([{"id": 27, "name": "Daft Punk"}, {"id": 28, "name": "Justice"}])),
        (116, json!([{"id": 28, "name": "Justice"}, {"id": 29, "name": "Air"}])),
    ] {
        Mock::given(method("GET"))
            .and(path(format!("/genre/{}/artists", genre)))
            .and(query_param("index", "0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": artists })))
            .mount(server)
            .await;
    }
}

async fn mount_artist_top(server: &MockServer, artist: i64, tracks: &[i64], expectation: u64) {
    let data: Vec<_> = tracks
        .iter()
        .map(|id| json!({"id": id, "title": format!("Top {}", id), "rank": 900_000}))
        .collect();
    Mock::given(method("GET"))
        .and(path(format!("/artist/{}/top", artist)))
        .and(query_param("limit", "50"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": data })))
        .expect(expectation)
        .mount(server)
        .await;
}

fn deezer_genres(server: &MockServer) -> DeezerGenres {
    DeezerGenres::new(DeezerConfig {
        api_base: server.uri(),
        genre_ids: vec![132, 116],
        ..DeezerConfig::default()
    })
}

#[tokio::test]
async fn test_genre_artists_expand_to_top_tracks() {
    init_test_logging();
    let server = MockServer::start().await;
    mount_genre_artists(&server).await;
    mount_artist_top(&server, 27, &[100, 101], 1).await;
    mount_artist_top(&server, 28, &[102], 1).await;
    mount_artist_top(&server, 29, &[103], 1).await;

    let store = MemorySnapshotStore::new();
    let report = pipeline(deezer_genres(&server), &store).run().await.unwrap();

    assert!(report.is_success());
    assert_eq!(report.searched(), 4);
    assert_eq!(report.discovered, 3);
    assert_eq!(report.missing, 3);
    assert_eq!(report.fetched, 4);
    assert_eq!(
        store.names(),
        vec![
            deezer::GENRE_ARTISTS_DATASET.name.to_string(),
            deezer::GENRES_DATASET.name.to_string(),
        ]
    );

    let artists = store.load(deezer::GENRE_ARTISTS_DATASET.name).await.unwrap();
    assert_eq!(artists.len(), 3);

    let tracks = store.load(deezer::GENRES_DATASET.name).await.unwrap();
    assert_eq!(
        key_set(&tracks, "artist_id"),
        BTreeSet::from([NaturalKey::Int(27), NaturalKey::Int(28), NaturalKey::Int(29)])
    );
    let genre_of = |track: i64| {
        tracks
            .iter()
            .find(|r| r.get("id") == Some(&Value::Int(track)))
            .and_then(|r| r.get("genre_id").cloned())
    };
    assert_eq!(genre_of(100), Some(Value::Int(132)));
    assert_eq!(genre_of(101), Some(Value::Int(132)));
    // Justice is listed under both genres; the later listing wins
    assert_eq!(genre_of(102), Some(Value::Int(116)));
    assert_eq!(genre_of(103), Some(Value::Int(116)));
}

#[tokio::test]
async fn test_second_genre_run_skips_known_artists() {
    init_test_logging();
    let server = MockServer::start().await;
    mount_genre_artists(&server).await;
    mount_artist_top(&server, 27, &[100], 1).await;
    mount_artist_top(&server, 28, &[102], 1).await;
    // No top tracks means no detail row, so the artist stays missing
    mount_artist_top(&server, 29, &[], 2).await;

    let store = MemorySnapshotStore::new();
    let first = pipeline(deezer_genres(&server), &store).run().await.unwrap();
    assert_eq!(first.missing, 3);
    assert_eq!(first.fetched, 2);

    let second = pipeline(deezer_genres(&server), &store).run().await.unwrap();
    assert_eq!(second.discovered, 3);
    assert_eq!(second.missing, 1);
    assert_eq!(second.fetched, 0);
    assert_eq!(store.load(deezer::GENRES_DATASET.name).await.unwrap().len(), 2);
}

// ============================================================================
// YouTube
// ============================================================================

#[tokio::test]
async fn test_publishes_through_videos_endpoint() {
    init_test_logging();
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/youtube/v3/search"))
        .and(query_param("key", "test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [search_item("aaa", "Pop hit")]
        })))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/youtube/v3/videos"))
        .and(query_param("id", "aaa"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{
                "id": "aaa",
                "snippet": {"title": "Pop hit", "description": "#pop"},
                "contentDetails": {"duration": "PT3M"},
                "statistics": {"viewCount": "100", "likeCount": "10"}
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let store = MemorySnapshotStore::new();
    let report = pipeline(YoutubeSource::new(youtube_config(&server)), &store)
        .run()
        .await
        .unwrap();

    // Both genres returned the same video
    assert_eq!(report.searched(), 2);
    assert_eq!(report.discovered, 1);
    let search = store.load(youtube::SEARCH_DATASET.name).await.unwrap();
    assert_eq!(search.len(), 1);
    assert_eq!(search.records()[0].get_str("genre"), Some("rock"));

    let videos = store.load(youtube::VIDEOS_DATASET.name).await.unwrap();
    let video = &videos.records()[0];
    assert_eq!(video.get("views"), Some(&Value::Int(100)));
    assert_eq!(video.get_f64("duration_seconds"), Some(180.0));
    assert_eq!(video.get_f64("engagement_rate"), Some(0.1));
}

#[tokio::test]
async fn test_rate_limit_mid_search_still_publishes() {
    init_test_logging();
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/youtube/v3/search"))
        .and(query_param("q", "pop"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [search_item("aaa", "Pop hit"), search_item("bbb", "Another")]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/youtube/v3/search"))
        .and(query_param("q", "rock"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/youtube/v3/videos"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": []})))
        .expect(0)
        .mount(&server)
        .await;

    let store = MemorySnapshotStore::new();
    let report = pipeline(YoutubeSource::new(youtube_config(&server)), &store)
        .run()
        .await
        .unwrap();

    assert_eq!(report.state, RunState::Done);
    assert!(report.rate_limited);
    assert_eq!(report.sub_queries.len(), 2);
    assert!(report.sub_queries[0].complete);
    assert!(!report.sub_queries[1].complete);
    assert_eq!(report.failures[0].status, Some(429));
    assert_eq!(report.fetched, 0);

    let search = store.load(youtube::SEARCH_DATASET.name).await.unwrap();
    assert_eq!(search.len(), 2);
    assert_eq!(report.published[1].outcome, SaveOutcome::SkippedEmpty);
    assert!(!store.contains(youtube::VIDEOS_DATASET.name));
}

#[tokio::test]
async fn test_quota_exceeded_halts_run() {
    init_test_logging();
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/youtube/v3/search"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "error": {"code": 403, "errors": [{"reason": "quotaExceeded"}]}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let store = MemorySnapshotStore::new();
    let report = pipeline(YoutubeSource::new(youtube_config(&server)), &store)
        .run()
        .await
        .unwrap();

    assert!(report.rate_limited);
    assert_eq!(report.sub_queries.len(), 1);
    assert_eq!(store.writes(), 0);
}

#[tokio::test]
async fn test_missing_api_key_fails_before_any_request() {
    init_test_logging();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let config = YoutubeConfig {
        api_key: String::new(),
        ..youtube_config(&server)
    };
    let store = MemorySnapshotStore::new();
    let failure = pipeline(YoutubeSource::new(config), &store)
        .run()
        .await
        .unwrap_err();

    assert_eq!(failure.report.state, RunState::Failed);
    assert_eq!(failure.report.failed_in, Some(RunState::Init));
    assert!(matches!(
        failure.error,
        IngestError::Config(ConfigError::Missing(ref var)) if var == "YOUTUBE_API_KEY"
    ));
    assert_eq!(store.writes(), 0);
}

// ============================================================================
// Spotify
// ============================================================================

fn spotify_config(server: &MockServer) -> SpotifyConfig {
    SpotifyConfig {
        client_id: "client".to_string(),
        client_secret: "secret".to_string(),
        token_url: format!("{}/api/token", server.uri()),
        api_base: format!("{}/v1", server.uri()),
        queries: vec!["miles davis".to_string()],
        seed_track_ids: Vec::new(),
        ..SpotifyConfig::default()
    }
}

#[tokio::test]
async fn test_rejected_credentials_fail_in_authenticated() {
    init_test_logging();
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/token"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid_client"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let store = MemorySnapshotStore::new();
    let source = SpotifySource::new(spotify_config(&server), reqwest::Client::new());
    let failure = pipeline(source, &store).run().await.unwrap_err();

    assert_eq!(failure.report.failed_in, Some(RunState::Authenticated));
    assert!(matches!(
        failure.error,
        IngestError::Auth(AuthError::Rejected { status, .. }) if status.as_u16() == 401
    ));
    assert!(failure.to_string().contains("authenticated"));
    assert_eq!(store.writes(), 0);
}

#[tokio::test]
async fn test_spotify_run_uses_bearer_token() {
    init_test_logging();
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "token-123",
            "token_type": "Bearer",
            "expires_in": 3600
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/search"))
        .and(query_param("type", "track"))
        .and(header("authorization", "Bearer token-123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "tracks": {
                "items": [{"id": "t1", "name": "So What", "popularity": 70, "artists": [{"name": "Miles Davis"}]}],
                "next": null
            }
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/search"))
        .and(header("authorization", "Bearer token-123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/tracks"))
        .and(query_param("ids", "t1"))
        .and(header("authorization", "Bearer token-123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "tracks": [
                {"id": "t1", "name": "So What", "duration_ms": 562_000, "album": {"name": "Kind of Blue"}},
                null
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let store = MemorySnapshotStore::new();
    let source = SpotifySource::new(spotify_config(&server), reqwest::Client::new());
    let report = pipeline(source, &store).run().await.unwrap();

    assert_eq!(report.sub_queries.len(), 3);
    assert_eq!(report.discovered, 1);
    assert_eq!(report.fetched, 1);

    let tracks = store.load(spotify::TRACKS_DATASET.name).await.unwrap();
    assert_eq!(tracks.records()[0].get_str("album"), Some("Kind of Blue"));
    assert_eq!(tracks.records()[0].get("duration_ms"), Some(&Value::Int(562_000)));
}
