//! REST API client module for the storefront backend.
//!
//! This module provides the `ApiClient` request pipeline, which attaches
//! the session's bearer token to outgoing calls and transparently
//! refreshes and retries when the backend rejects an expired token.
//!
//! The raw authentication endpoints live in `AuthApi`; only the session
//! manager calls them.

pub mod auth;
pub mod client;
pub mod error;
pub mod request;

pub use auth::{AuthApi, RefreshedTokens, TokenPair};
pub use client::{ApiClient, TokenProvider};
pub use error::ApiError;
pub use request::{ApiRequest, AuthPolicy, RetryBudget};

use reqwest::Url;

/// Parse a base URL, making sure its path ends in `/` so relative endpoint
/// paths join beneath it instead of replacing its last segment.
pub fn normalize_base_url(raw: &str) -> Result<Url, ApiError> {
    let mut url = Url::parse(raw.trim()).map_err(|e| ApiError::InvalidUrl(format!("{}: {}", raw, e)))?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

pub(crate) fn endpoint_url(base: &Url, path: &str) -> Result<Url, ApiError> {
    base.join(path.trim_start_matches('/'))
        .map_err(|e| ApiError::InvalidUrl(format!("{}: {}", path, e)))
}
