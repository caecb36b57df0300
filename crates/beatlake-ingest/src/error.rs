//! Error taxonomy for ingestion runs
//!
//! Each concern has its own error type so the pipeline driver can decide
//! what is fatal and what only ends one sub-query. [`IngestError`] wraps them
//! all for callers that just need to propagate.

use beatlake_common::KeyError;
use reqwest::StatusCode;
use thiserror::Error;

/// Result type alias for ingestion operations
pub type Result<T> = std::result::Result<T, IngestError>;

/// Required configuration is missing or malformed (fatal, pre-flight)
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required configuration: {0}")]
    Missing(String),

    #[error("Invalid value for {var}: {reason}")]
    Invalid { var: String, reason: String },
}

impl ConfigError {
    pub fn invalid(var: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            var: var.into(),
            reason: reason.into(),
        }
    }
}

/// Credential exchange failed (fatal, never retried)
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Token endpoint rejected credentials with {status}: {body}")]
    Rejected { status: StatusCode, body: String },

    #[error("Token endpoint returned no access_token: {0}")]
    MalformedResponse(String),

    #[error("Token request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// External API call failed
#[derive(Error, Debug)]
pub enum ApiError {
    /// Non-success status other than a retryable rate limit
    #[error("GET {url} failed with {status}: {body}")]
    Http {
        url: String,
        status: StatusCode,
        body: String,
    },

    /// Still rate limited after every allowed attempt
    #[error("GET {url} still rate limited after {attempts} attempts")]
    RateLimitExhausted { url: String, attempts: u32 },

    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Unexpected response from {url}: {reason}")]
    Decode { url: String, reason: String },
}

impl ApiError {
    pub fn decode(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Decode {
            url: url.into(),
            reason: reason.into(),
        }
    }

    pub fn is_rate_limit(&self) -> bool {
        matches!(self, ApiError::RateLimitExhausted { .. })
    }

    /// Upstream status, when the failure carried one
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiError::Http { status, .. } => Some(*status),
            ApiError::RateLimitExhausted { .. } => Some(StatusCode::TOO_MANY_REQUESTS),
            ApiError::Transport(e) => e.status(),
            ApiError::Decode { .. } => None,
        }
    }
}

/// Object storage or snapshot encoding failed (fatal)
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Object storage request for '{key}' failed: {reason}")]
    Backend { key: String, reason: String },

    #[error("Snapshot '{name}' could not be encoded or decoded: {reason}")]
    Codec { name: String, reason: String },
}

impl StorageError {
    pub fn backend(key: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Backend {
            key: key.into(),
            reason: reason.to_string(),
        }
    }

    pub fn codec(name: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Codec {
            name: name.into(),
            reason: reason.to_string(),
        }
    }
}

/// Input violates the natural-key contract (fatal)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MergeError {
    #[error("Record {position} of the {side} input has no '{field}' key")]
    MissingKey {
        field: String,
        side: MergeSide,
        position: usize,
    },

    #[error("Record {position} of the {side} input has an unsupported {kind} '{field}' key")]
    UnsupportedKey {
        field: String,
        kind: &'static str,
        side: MergeSide,
        position: usize,
    },

    /// Integer and string keys in one column
    #[error("Record {position} of the {side} input has a {found} '{field}' key, expected {expected}")]
    MixedKeyKinds {
        field: String,
        expected: &'static str,
        found: &'static str,
        side: MergeSide,
        position: usize,
    },
}

impl MergeError {
    pub(crate) fn from_key_error(err: KeyError, side: MergeSide, position: usize) -> Self {
        match err {
            KeyError::Missing { field } => MergeError::MissingKey {
                field,
                side,
                position,
            },
            KeyError::Unsupported { field, kind } => MergeError::UnsupportedKey {
                field,
                kind,
                side,
                position,
            },
        }
    }
}

/// Which merge input a failing record came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeSide {
    Existing,
    Incoming,
}

impl std::fmt::Display for MergeSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MergeSide::Existing => write!(f, "existing"),
            MergeSide::Incoming => write!(f, "incoming"),
        }
    }
}

/// Any failure that ends an ingestion run
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Merge error: {0}")]
    Merge(#[from] MergeError),
}
