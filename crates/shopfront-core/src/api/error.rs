use serde::Deserialize;
use thiserror::Error;

use crate::auth::StoreError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("Not authenticated - please log in")]
    Unauthenticated,

    #[error("Access token rejected - token may be expired")]
    TokenRejected,

    #[error("Refresh token rejected - session has ended")]
    RefreshRejected,

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid request URL: {0}")]
    InvalidUrl(String),

    #[error("Credential storage failed: {0}")]
    Storage(#[from] StoreError),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// Error code the backend's JWT layer puts in a 401 body when the
/// presented token is expired or otherwise invalid.
const TOKEN_NOT_VALID_CODE: &str = "token_not_valid";

#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: Option<String>,
}

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            return body.to_string();
        }
        let mut end = MAX_ERROR_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
    }

    fn is_token_not_valid(body: &str) -> bool {
        serde_json::from_str::<ErrorBody>(body)
            .ok()
            .and_then(|b| b.code)
            .is_some_and(|code| code == TOKEN_NOT_VALID_CODE)
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let truncated = Self::truncate_body(body);
        match status.as_u16() {
            401 if Self::is_token_not_valid(body) => ApiError::TokenRejected,
            401 => ApiError::Unauthenticated,
            403 => ApiError::AccessDenied(truncated),
            404 => ApiError::NotFound(truncated),
            429 => ApiError::RateLimited,
            500..=599 => ApiError::ServerError(truncated),
            _ => ApiError::InvalidResponse(format!("Status {}: {}", status, truncated)),
        }
    }

    /// True for the backend's "credential invalid or expired" signal, as
    /// opposed to a generic permission denial.
    pub fn is_auth_rejection(&self) -> bool {
        matches!(self, ApiError::TokenRejected | ApiError::RefreshRejected)
    }
}

/// Check if response is successful, returning an error with body if not.
pub(crate) async fn check_response(
    response: reqwest::Response,
) -> Result<reqwest::Response, ApiError> {
    if response.status().is_success() {
        Ok(response)
    } else {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(ApiError::from_status(status, &body))
    }
}
