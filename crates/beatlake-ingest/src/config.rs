//! Configuration management
//!
//! Everything is read from the environment (a `.env` file is honoured).
//! Loading never fails on an absent credential: each source validates its own
//! section when a run starts, so one misconfigured source does not block the
//! others.

use crate::error::ConfigError;
use crate::fetcher::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;

// ============================================================================
// Fetch Configuration Constants
// ============================================================================

/// Default total requests per call, including the first.
pub const DEFAULT_MAX_ATTEMPTS: u32 = crate::fetcher::retry::DEFAULT_MAX_ATTEMPTS;

/// Default pause when a rate-limited response has no `Retry-After`.
pub const DEFAULT_RETRY_AFTER_SECS: u64 = crate::fetcher::retry::DEFAULT_RETRY_AFTER_SECS;

/// Default pause between detail batches, in milliseconds.
pub const DEFAULT_BATCH_PAUSE_MS: u64 = 200;

/// Default HTTP request timeout in seconds.
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

// ============================================================================
// Source Configuration Constants
// ============================================================================

pub const DEFAULT_YOUTUBE_API_BASE: &str = "https://www.googleapis.com/youtube/v3";

/// Genre keywords searched on YouTube.
pub const DEFAULT_YOUTUBE_QUERIES: &[&str] = &[
    "pop",
    "electronic",
    "heavy metal",
    "country",
    "jazz",
    "hip hop",
    "classical",
    "folk",
    "rock",
    "reggae",
    "blues",
    "r&b",
];

pub const DEFAULT_YOUTUBE_MAX_RESULTS_PER_QUERY: usize = 10;

/// Videos always fetched in detail, whether or not a search surfaced them.
pub const DEFAULT_YOUTUBE_SEED_VIDEO_IDS: &[&str] = &["Eb8rXCzJMUc"];

pub const DEFAULT_YOUTUBE_REGION: &str = "US";

pub const DEFAULT_SPOTIFY_API_BASE: &str = "https://api.spotify.com/v1";

pub const DEFAULT_SPOTIFY_QUERIES: &[&str] = &["remaster track:Doxy artist:Miles Davis"];

pub const DEFAULT_SPOTIFY_SEED_TRACK_IDS: &[&str] = &[
    "7ouMYWpwJ422jRcDASZB7P",
    "4VqPOruhp5EdPBeR92t6lQ",
    "2takcwOaAZWiXQijPHIx7B",
];

pub const DEFAULT_SPOTIFY_MAX_RESULTS_PER_QUERY: usize = 50;

pub const DEFAULT_SPOTIFY_MARKET: &str = "US";

pub const DEFAULT_DEEZER_API_BASE: &str = "https://api.deezer.com";

pub const DEFAULT_DEEZER_GENRE_IDS: &[i64] = &[132, 116, 152, 113, 106];

pub const DEFAULT_DEEZER_MAX_RESULTS_PER_QUERY: usize = 100;

/// Full ingestion configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestConfig {
    pub fetch: FetchConfig,
    pub youtube: YoutubeConfig,
    pub spotify: SpotifyConfig,
    pub deezer: DeezerConfig,
    /// Downstream warehouse connection, only reported
    pub warehouse: Option<WarehouseConfig>,
}

impl IngestConfig {
    /// Load configuration from environment and defaults
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_env()
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self {
            fetch: FetchConfig::from_env()?,
            youtube: YoutubeConfig::from_env()?,
            spotify: SpotifyConfig::from_env()?,
            deezer: DeezerConfig::from_env()?,
            warehouse: WarehouseConfig::from_env()?,
        };
        config.fetch.validate()?;
        Ok(config)
    }
}

/// Retry and pacing shared by every source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    pub max_attempts: u32,
    pub default_retry_after_secs: u64,
    pub batch_pause_ms: u64,
    pub http_timeout_secs: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            default_retry_after_secs: DEFAULT_RETRY_AFTER_SECS,
            batch_pause_ms: DEFAULT_BATCH_PAUSE_MS,
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
        }
    }
}

impl FetchConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            max_attempts: parse_var("INGEST_MAX_ATTEMPTS", DEFAULT_MAX_ATTEMPTS)?,
            default_retry_after_secs: parse_var(
                "INGEST_DEFAULT_RETRY_AFTER_SECS",
                DEFAULT_RETRY_AFTER_SECS,
            )?,
            batch_pause_ms: parse_var("INGEST_BATCH_PAUSE_MS", DEFAULT_BATCH_PAUSE_MS)?,
            http_timeout_secs: parse_var("INGEST_HTTP_TIMEOUT_SECS", DEFAULT_HTTP_TIMEOUT_SECS)?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::invalid("INGEST_MAX_ATTEMPTS", "must be greater than 0"));
        }
        if self.http_timeout_secs == 0 {
            return Err(ConfigError::invalid(
                "INGEST_HTTP_TIMEOUT_SECS",
                "must be greater than 0",
            ));
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_secs(self.default_retry_after_secs),
        )
    }

    pub fn batch_pause(&self) -> Duration {
        Duration::from_millis(self.batch_pause_ms)
    }

    pub fn http_client(&self) -> reqwest::Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(Duration::from_secs(self.http_timeout_secs))
            .user_agent(concat!("beatlake-ingest/", env!("CARGO_PKG_VERSION")))
            .build()
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct YoutubeConfig {
    pub api_key: String,
    pub api_base: String,
    pub queries: Vec<String>,
    pub max_results_per_query: usize,
    pub seed_video_ids: Vec<String>,
    pub region_code: String,
}

impl Default for YoutubeConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base: DEFAULT_YOUTUBE_API_BASE.to_string(),
            queries: to_strings(DEFAULT_YOUTUBE_QUERIES),
            max_results_per_query: DEFAULT_YOUTUBE_MAX_RESULTS_PER_QUERY,
            seed_video_ids: to_strings(DEFAULT_YOUTUBE_SEED_VIDEO_IDS),
            region_code: DEFAULT_YOUTUBE_REGION.to_string(),
        }
    }
}

impl std::fmt::Debug for YoutubeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("YoutubeConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_base", &self.api_base)
            .field("queries", &self.queries)
            .field("max_results_per_query", &self.max_results_per_query)
            .field("seed_video_ids", &self.seed_video_ids)
            .field("region_code", &self.region_code)
            .finish()
    }
}

impl YoutubeConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            api_key: env::var("YOUTUBE_API_KEY").unwrap_or_default(),
            api_base: env::var("YOUTUBE_API_BASE").unwrap_or(defaults.api_base),
            queries: list_var("YOUTUBE_QUERIES").unwrap_or(defaults.queries),
            max_results_per_query: parse_var(
                "YOUTUBE_MAX_RESULTS_PER_QUERY",
                defaults.max_results_per_query,
            )?,
            seed_video_ids: list_var("YOUTUBE_SEED_VIDEO_IDS").unwrap_or(defaults.seed_video_ids),
            region_code: env::var("YOUTUBE_REGION_CODE").unwrap_or(defaults.region_code),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_key.trim().is_empty() || self.api_key == "your_youtube_api_key" {
            return Err(ConfigError::Missing("YOUTUBE_API_KEY".to_string()));
        }
        if self.max_results_per_query == 0 {
            return Err(ConfigError::invalid(
                "YOUTUBE_MAX_RESULTS_PER_QUERY",
                "must be greater than 0",
            ));
        }
        validate_base("YOUTUBE_API_BASE", &self.api_base)
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct SpotifyConfig {
    pub client_id: String,
    pub client_secret: String,
    pub token_url: String,
    pub api_base: String,
    pub queries: Vec<String>,
    pub max_results_per_query: usize,
    pub seed_track_ids: Vec<String>,
    pub market: String,
}

impl Default for SpotifyConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            token_url: crate::auth::SPOTIFY_TOKEN_URL.to_string(),
            api_base: DEFAULT_SPOTIFY_API_BASE.to_string(),
            queries: to_strings(DEFAULT_SPOTIFY_QUERIES),
            max_results_per_query: DEFAULT_SPOTIFY_MAX_RESULTS_PER_QUERY,
            seed_track_ids: to_strings(DEFAULT_SPOTIFY_SEED_TRACK_IDS),
            market: DEFAULT_SPOTIFY_MARKET.to_string(),
        }
    }
}

impl std::fmt::Debug for SpotifyConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpotifyConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &redact(&self.client_secret))
            .field("token_url", &self.token_url)
            .field("api_base", &self.api_base)
            .field("queries", &self.queries)
            .field("max_results_per_query", &self.max_results_per_query)
            .field("seed_track_ids", &self.seed_track_ids)
            .field("market", &self.market)
            .finish()
    }
}

impl SpotifyConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            client_id: env::var("SPOTIFY_CLIENT_ID").unwrap_or_default(),
            client_secret: env::var("SPOTIFY_CLIENT_SECRET").unwrap_or_default(),
            token_url: env::var("SPOTIFY_TOKEN_URL").unwrap_or(defaults.token_url),
            api_base: env::var("SPOTIFY_API_BASE").unwrap_or(defaults.api_base),
            queries: list_var("SPOTIFY_QUERIES").unwrap_or(defaults.queries),
            max_results_per_query: parse_var(
                "SPOTIFY_MAX_RESULTS_PER_QUERY",
                defaults.max_results_per_query,
            )?,
            seed_track_ids: list_var("SPOTIFY_SEED_TRACK_IDS").unwrap_or(defaults.seed_track_ids),
            market: env::var("SPOTIFY_MARKET").unwrap_or(defaults.market),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.client_id.trim().is_empty() {
            return Err(ConfigError::Missing("SPOTIFY_CLIENT_ID".to_string()));
        }
        if self.client_secret.trim().is_empty() {
            return Err(ConfigError::Missing("SPOTIFY_CLIENT_SECRET".to_string()));
        }
        if self.max_results_per_query == 0 {
            return Err(ConfigError::invalid(
                "SPOTIFY_MAX_RESULTS_PER_QUERY",
                "must be greater than 0",
            ));
        }
        validate_base("SPOTIFY_API_BASE", &self.api_base)?;
        validate_base("SPOTIFY_TOKEN_URL", &self.token_url)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeezerConfig {
    pub api_base: String,
    pub genre_ids: Vec<i64>,
    pub max_results_per_query: usize,
}

impl Default for DeezerConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_DEEZER_API_BASE.to_string(),
            genre_ids: DEFAULT_DEEZER_GENRE_IDS.to_vec(),
            max_results_per_query: DEFAULT_DEEZER_MAX_RESULTS_PER_QUERY,
        }
    }
}

impl DeezerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let genre_ids = match list_var("DEEZER_GENRE_IDS") {
            Some(ids) => ids
                .iter()
                .map(|id| {
                    id.parse::<i64>().map_err(|_| {
                        ConfigError::invalid("DEEZER_GENRE_IDS", format!("'{}' is not an integer", id))
                    })
                })
                .collect::<Result<Vec<_>, _>>()?,
            None => defaults.genre_ids,
        };

        Ok(Self {
            api_base: env::var("DEEZER_API_BASE").unwrap_or(defaults.api_base),
            genre_ids,
            max_results_per_query: parse_var(
                "DEEZER_MAX_RESULTS_PER_QUERY",
                defaults.max_results_per_query,
            )?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_results_per_query == 0 {
            return Err(ConfigError::invalid(
                "DEEZER_MAX_RESULTS_PER_QUERY",
                "must be greater than 0",
            ));
        }
        validate_base("DEEZER_API_BASE", &self.api_base)
    }
}

/// Warehouse connection parameters (`POSTGRES_*`)
#[derive(Clone, Serialize, Deserialize)]
pub struct WarehouseConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
}

impl std::fmt::Debug for WarehouseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WarehouseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &redact(&self.password))
            .finish()
    }
}

impl WarehouseConfig {
    /// `None` unless `POSTGRES_HOST` is set
    pub fn from_env() -> Result<Option<Self>, ConfigError> {
        let Ok(host) = env::var("POSTGRES_HOST") else {
            return Ok(None);
        };
        Ok(Some(Self {
            host,
            port: parse_var("POSTGRES_PORT", 5432)?,
            database: env::var("POSTGRES_DB").unwrap_or_else(|_| "postgres".to_string()),
            user: env::var("POSTGRES_USER").unwrap_or_else(|_| "postgres".to_string()),
            password: env::var("POSTGRES_PASSWORD").unwrap_or_default(),
        }))
    }
}

fn to_strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

fn redact(secret: &str) -> &'static str {
    if secret.is_empty() {
        "<unset>"
    } else {
        "<redacted>"
    }
}

fn parse_var<T: FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::invalid(name, format!("cannot parse '{}'", raw))),
        _ => Ok(default),
    }
}

/// Comma-separated list; `None` when the variable is unset or blank
fn list_var(name: &str) -> Option<Vec<String>> {
    let raw = env::var(name).ok()?;
    let items: Vec<String> = raw
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    (!items.is_empty()).then_some(items)
}

fn validate_base(var: &str, url: &str) -> Result<(), ConfigError> {
    reqwest::Url::parse(url)
        .map(|_| ())
        .map_err(|e| ConfigError::invalid(var, format!("'{}' is not a URL: {}", url, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: &[&str] = &[
        "INGEST_MAX_ATTEMPTS",
        "INGEST_DEFAULT_RETRY_AFTER_SECS",
        "INGEST_BATCH_PAUSE_MS",
        "INGEST_HTTP_TIMEOUT_SECS",
        "YOUTUBE_API_KEY",
        "YOUTUBE_QUERIES",
        "YOUTUBE_MAX_RESULTS_PER_QUERY",
        "YOUTUBE_SEED_VIDEO_IDS",
        "SPOTIFY_CLIENT_ID",
        "SPOTIFY_CLIENT_SECRET",
        "DEEZER_GENRE_IDS",
        "POSTGRES_HOST",
        "POSTGRES_PORT",
    ];

    fn clear() {
        for var in VARS {
            env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_defaults_from_empty_environment() {
        clear();
        let config = IngestConfig::from_env().unwrap();

        assert_eq!(config.fetch.max_attempts, 3);
        assert_eq!(config.fetch.batch_pause(), Duration::from_millis(200));
        assert_eq!(config.youtube.queries.len(), 12);
        assert_eq!(config.youtube.seed_video_ids, vec!["Eb8rXCzJMUc"]);
        assert_eq!(config.deezer.genre_ids, vec![132, 116, 152, 113, 106]);
        assert!(config.warehouse.is_none());
    }

    #[test]
    #[serial]
    fn test_lists_and_numbers_from_environment() {
        clear();
        env::set_var("YOUTUBE_QUERIES", "jazz, ,blues");
        env::set_var("DEEZER_GENRE_IDS", "132,85");
        env::set_var("INGEST_MAX_ATTEMPTS", "5");

        let config = IngestConfig::from_env().unwrap();
        assert_eq!(config.youtube.queries, vec!["jazz", "blues"]);
        assert_eq!(config.deezer.genre_ids, vec![132, 85]);
        assert_eq!(config.fetch.retry_policy().max_attempts, 5);
        clear();
    }

    #[test]
    #[serial]
    fn test_invalid_number_is_reported() {
        clear();
        env::set_var("INGEST_BATCH_PAUSE_MS", "soon");

        match IngestConfig::from_env() {
            Err(ConfigError::Invalid { var, .. }) => assert_eq!(var, "INGEST_BATCH_PAUSE_MS"),
            other => panic!("expected invalid value, got {:?}", other),
        }
        clear();
    }

    #[test]
    #[serial]
    fn test_zero_attempts_rejected() {
        clear();
        env::set_var("INGEST_MAX_ATTEMPTS", "0");
        assert!(matches!(
            IngestConfig::from_env(),
            Err(ConfigError::Invalid { .. })
        ));
        clear();
    }

    #[test]
    #[serial]
    fn test_warehouse_is_optional() {
        clear();
        env::set_var("POSTGRES_HOST", "warehouse");
        let warehouse = WarehouseConfig::from_env().unwrap().unwrap();
        assert_eq!(warehouse.port, 5432);
        assert!(format!("{:?}", warehouse).contains("<unset>"));
        clear();
    }

    #[test]
    fn test_source_validation() {
        let youtube = YoutubeConfig::default();
        match youtube.validate() {
            Err(ConfigError::Missing(var)) => assert_eq!(var, "YOUTUBE_API_KEY"),
            other => panic!("expected missing key, got {:?}", other),
        }

        let spotify = SpotifyConfig {
            client_id: "id".to_string(),
            ..SpotifyConfig::default()
        };
        assert!(matches!(spotify.validate(), Err(ConfigError::Missing(var)) if var == "SPOTIFY_CLIENT_SECRET"));

        let deezer = DeezerConfig {
            api_base: "not a url".to_string(),
            ..DeezerConfig::default()
        };
        assert!(matches!(deezer.validate(), Err(ConfigError::Invalid { .. })));
        assert!(DeezerConfig::default().validate().is_ok());
    }

    #[test]
    fn test_secrets_are_redacted() {
        let youtube = YoutubeConfig {
            api_key: "AIza-secret".to_string(),
            ..YoutubeConfig::default()
        };
        assert!(!format!("{:?}", youtube).contains("AIza-secret"));
    }
}
