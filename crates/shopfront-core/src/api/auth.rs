//! Raw calls to the backend's authentication endpoints.
//!
//! These bypass the request pipeline: the session manager is the only
//! caller and handles token rejection itself.

use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::check_response;
use super::{endpoint_url, ApiError};
use crate::auth::Profile;

const LOGIN_PATH: &str = "auth/login/";
const USER_PATH: &str = "auth/user/";
const REFRESH_PATH: &str = "auth/refresh/";

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    refresh: &'a str,
}

/// Token pair issued at login.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

/// Refresh response. The backend only returns a new refresh token when it
/// rotates them.
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshedTokens {
    pub access: String,
    pub refresh: Option<String>,
}

/// Client for the login, current-user and refresh endpoints.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct AuthApi {
    client: Client,
    base_url: Url,
}

impl AuthApi {
    pub fn new(client: Client, base_url: Url) -> Self {
        Self { client, base_url }
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<TokenPair, ApiError> {
        let url = endpoint_url(&self.base_url, LOGIN_PATH)?;
        debug!(%url, username, "Sending login request");

        let response = self
            .client
            .post(url)
            .json(&LoginRequest { username, password })
            .send()
            .await?;

        if Self::is_rejection(response.status()) {
            return Err(ApiError::InvalidCredentials);
        }

        let response = check_response(response).await?;
        Self::parse(response).await
    }

    pub async fn fetch_user(&self, access_token: &str) -> Result<Profile, ApiError> {
        let url = endpoint_url(&self.base_url, USER_PATH)?;

        let response = self
            .client
            .get(url)
            .bearer_auth(access_token)
            .send()
            .await?;

        let response = check_response(response).await?;
        Self::parse(response).await
    }

    pub async fn refresh(&self, refresh_token: &str) -> Result<RefreshedTokens, ApiError> {
        let url = endpoint_url(&self.base_url, REFRESH_PATH)?;
        debug!(%url, "Sending token refresh request");

        let response = self
            .client
            .post(url)
            .json(&RefreshRequest {
                refresh: refresh_token,
            })
            .send()
            .await?;

        if Self::is_rejection(response.status()) {
            return Err(ApiError::RefreshRejected);
        }

        let response = check_response(response).await?;
        Self::parse(response).await
    }

    /// Login and refresh answer bad credentials with 401 and a missing or
    /// malformed field with 400.
    fn is_rejection(status: StatusCode) -> bool {
        matches!(status, StatusCode::UNAUTHORIZED | StatusCode::BAD_REQUEST)
    }

    async fn parse<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ApiError> {
        let url = response.url().clone();
        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| {
            ApiError::InvalidResponse(format!("Failed to parse response from {}: {}", url, e))
        })
    }
}
