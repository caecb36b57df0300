//! Credential acquisition for APIs that need a bearer token

use crate::error::AuthError;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, error, info, instrument};

/// Spotify's client-credentials token endpoint
pub const SPOTIFY_TOKEN_URL: &str = "https://accounts.spotify.com/api/token";

/// Bearer credential. Acquired once per run; expiry is not tracked.
#[derive(Clone, PartialEq, Eq)]
pub struct Token(String);

impl Token {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn secret(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Token(<redacted>)")
    }
}

/// How a request to an external API is authenticated
#[derive(Debug, Clone)]
pub enum Auth {
    /// `Authorization: Bearer <token>`
    Bearer(Token),
    /// API key passed as a query parameter (YouTube's `key=`)
    QueryKey { param: String, value: String },
    Anonymous,
}

impl Auth {
    pub fn query_key(param: impl Into<String>, value: impl Into<String>) -> Self {
        Self::QueryKey {
            param: param.into(),
            value: value.into(),
        }
    }

    pub(crate) fn apply(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self {
            Auth::Bearer(token) => request.bearer_auth(token.secret()),
            Auth::QueryKey { param, value } => request.query(&[(param.as_str(), value.as_str())]),
            Auth::Anonymous => request,
        }
    }
}

/// Source of bearer tokens for a run
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn acquire(&self) -> Result<Token, AuthError>;
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
}

/// OAuth2 client-credentials exchange against a fixed token endpoint
pub struct ClientCredentials {
    client: Client,
    token_url: String,
    client_id: String,
    client_secret: String,
}

impl ClientCredentials {
    pub fn new(
        client: Client,
        token_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            client,
            token_url: token_url.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }
}

#[async_trait]
impl TokenProvider for ClientCredentials {
    #[instrument(skip(self), fields(token_url = %self.token_url))]
    async fn acquire(&self) -> Result<Token, AuthError> {
        debug!("Requesting client-credentials token");

        let response = self
            .client
            .post(&self.token_url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %body, "Token request rejected");
            return Err(AuthError::Rejected { status, body });
        }

        let body = response.text().await?;
        let parsed: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| AuthError::MalformedResponse(e.to_string()))?;

        match parsed.access_token {
            Some(token) if !token.is_empty() => {
                info!("Acquired access token");
                Ok(Token::new(token))
            },
            _ => Err(AuthError::MalformedResponse(body)),
        }
    }
}
