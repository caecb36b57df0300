//! Rate-limited JSON fetcher and pagination
//!
//! [`Fetcher::get`] is the only place that talks HTTP to the source APIs. It
//! honours `Retry-After` on rate-limited responses and gives up after
//! [`RetryPolicy::max_attempts`] requests; every other failure is returned
//! to the caller on the first attempt.

pub mod pagination;
pub mod retry;

pub use pagination::{paginate, paginate_from, Page, PageQuery, Pager, QueryCursor};
pub use retry::RetryPolicy;

use crate::auth::Auth;
use crate::error::ApiError;
use reqwest::Client;
use tracing::{debug, error, instrument, warn};

#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
    policy: RetryPolicy,
}

impl Fetcher {
    pub fn new(client: Client, policy: RetryPolicy) -> Self {
        Self { client, policy }
    }

    /// GET `url` and parse the body as JSON
    #[instrument(skip(self, auth), fields(url = %url))]
    pub async fn get(&self, url: &str, auth: &Auth) -> Result<serde_json::Value, ApiError> {
        let max_attempts = self.policy.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            let response = auth.apply(self.client.get(url)).send().await?;
            let status = response.status();

            if status.is_success() {
                let body = response.text().await?;
                debug!(attempt, bytes = body.len(), "Fetched");
                return serde_json::from_str(&body).map_err(|e| ApiError::decode(url, e.to_string()));
            }

            if self.policy.should_retry(status) {
                if attempt == max_attempts {
                    break;
                }
                let delay = self.policy.delay_for(response.headers());
                warn!(
                    status = %status,
                    attempt,
                    max_attempts,
                    delay_secs = delay.as_secs(),
                    "Rate limited, waiting before retry"
                );
                tokio::time::sleep(delay).await;
                continue;
            }

            let body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %body, "Request failed");
            return Err(ApiError::Http {
                url: url.to_string(),
                status,
                body,
            });
        }

        error!(attempts = max_attempts, "Rate limit not lifted, giving up");
        Err(ApiError::RateLimitExhausted {
            url: url.to_string(),
            attempts: max_attempts,
        })
    }
}
