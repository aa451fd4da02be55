//! Authenticated request pipeline.
//!
//! Every call goes through `ApiClient::execute`, which:
//! 1. attaches the session's current access token as a bearer token, if any
//! 2. backs off and retries on rate limiting (429)
//! 3. on a rejected access token, asks the session for a single-flight
//!    refresh and re-issues the call at most once
//!
//! The client never writes credentials. It only sees the session through
//! the narrow `TokenProvider` capability.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use super::error::check_response;
use super::request::{ApiRequest, AuthPolicy, RetryBudget};
use super::{endpoint_url, ApiError};

// ============================================================================
// Constants
// ============================================================================

/// Maximum number of retries for rate-limited (429) requests.
/// 3 retries with exponential backoff usually succeeds without excessive delay.
pub const DEFAULT_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
/// 1 second is polite to the server while not making users wait too long.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// What the request pipeline needs from the session: read the current
/// access token, and ask for it to be refreshed.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    fn access_token(&self) -> Option<String>;

    /// Refresh the access token. Concurrent callers share one refresh.
    async fn refresh_access(&self) -> bool;
}

/// API client for the storefront backend.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: Url,
    tokens: Arc<dyn TokenProvider>,
    rate_limit_retries: u32,
    initial_backoff: Duration,
}

impl ApiClient {
    pub fn new(client: Client, base_url: Url, tokens: Arc<dyn TokenProvider>) -> Self {
        Self {
            client,
            base_url,
            tokens,
            rate_limit_retries: DEFAULT_RATE_LIMIT_RETRIES,
            initial_backoff: Duration::from_millis(INITIAL_BACKOFF_MS),
        }
    }

    /// Override the rate limit retry policy
    pub fn with_rate_limit(mut self, retries: u32, initial_backoff: Duration) -> Self {
        self.rate_limit_retries = retries;
        self.initial_backoff = initial_backoff;
        self
    }

    /// Override only the number of rate limit retries
    pub fn with_rate_limit_retries(mut self, retries: u32) -> Self {
        self.rate_limit_retries = retries;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Issue a call, refreshing and retrying once if the access token is
    /// rejected. Returns the successful response.
    pub async fn execute(&self, request: &ApiRequest) -> Result<reqwest::Response, ApiError> {
        let mut budget = RetryBudget::new();
        let mut token = self.tokens.access_token();

        loop {
            match self.send_with_backoff(request, token.as_deref()).await {
                Err(ApiError::TokenRejected) => {}
                other => return other,
            }

            if !budget.try_auth_retry() {
                warn!(path = %request.path, "Access token rejected again after retry");
                return Err(ApiError::Unauthenticated);
            }

            if self.renew(token.as_deref()).await {
                if let Some(fresh) = self.tokens.access_token() {
                    debug!(path = %request.path, "Retrying with refreshed access token");
                    token = Some(fresh);
                    continue;
                }
            }

            match request.auth {
                AuthPolicy::AnonymousFallback => {
                    debug!(path = %request.path, "Refresh unavailable, retrying anonymously");
                    token = None;
                }
                AuthPolicy::Required => return Err(ApiError::Unauthenticated),
            }
        }
    }

    /// Get a fresh access token after `rejected` was refused by the backend.
    ///
    /// If the session already holds a different token, another call
    /// refreshed in the meantime and that token is reused as is.
    async fn renew(&self, rejected: Option<&str>) -> bool {
        if let (Some(current), Some(rejected)) = (self.tokens.access_token(), rejected) {
            if current != rejected {
                debug!("Access token already replaced, skipping refresh");
                return true;
            }
        }
        self.tokens.refresh_access().await
    }

    async fn send_with_backoff(
        &self,
        request: &ApiRequest,
        token: Option<&str>,
    ) -> Result<reqwest::Response, ApiError> {
        let url = endpoint_url(&self.base_url, &request.path)?;
        let mut retries = 0;
        let mut backoff = self.initial_backoff;

        loop {
            let mut builder = self.client.request(request.method.clone(), url.clone());
            if !request.query.is_empty() {
                builder = builder.query(&request.query);
            }
            if let Some(token) = token {
                builder = builder.bearer_auth(token);
            }
            if let Some(ref body) = request.body {
                builder = builder.json(body);
            }

            let response = builder.send().await?;

            if response.status() == StatusCode::TOO_MANY_REQUESTS {
                retries += 1;
                if retries > self.rate_limit_retries {
                    return Err(ApiError::RateLimited);
                }
                warn!(url = %url, retry = retries, backoff_ms = backoff.as_millis() as u64, "Rate limited, backing off");
                tokio::time::sleep(backoff).await;
                backoff *= 2; // Exponential backoff
                continue;
            }

            return check_response(response).await;
        }
    }

    /// Issue a call and deserialize its JSON response body
    pub async fn send_json<T: DeserializeOwned>(&self, request: &ApiRequest) -> Result<T, ApiError> {
        let response = self.execute(request).await?;
        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| {
            ApiError::InvalidResponse(format!(
                "Failed to parse JSON response from {}: {}",
                request.path, e
            ))
        })
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.send_json(&ApiRequest::get(path)).await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T, ApiError> {
        self.send_json(&ApiRequest::post(path).json(body)?).await
    }

    pub async fn put<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T, ApiError> {
        self.send_json(&ApiRequest::put(path).json(body)?).await
    }

    pub async fn patch<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T, ApiError> {
        self.send_json(&ApiRequest::patch(path).json(body)?).await
    }

    /// Delete a resource. The response body, if any, is discarded.
    pub async fn delete(&self, path: &str) -> Result<(), ApiError> {
        self.execute(&ApiRequest::delete(path)).await.map(|_| ())
    }
}
