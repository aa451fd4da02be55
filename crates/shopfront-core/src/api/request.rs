use reqwest::Method;
use serde::Serialize;
use serde_json::Value;

use super::ApiError;

/// Maximum number of times one call is re-issued after the backend
/// rejected its access token.
pub const MAX_AUTH_RETRIES: u8 = 1;

/// What the pipeline does when a token is rejected and cannot be refreshed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AuthPolicy {
    /// Fail the call with `ApiError::Unauthenticated`.
    #[default]
    Required,
    /// Re-issue the call once without a bearer token. For endpoints that
    /// also serve anonymous visitors (catalog, cart, checkout).
    AnonymousFallback,
}

/// Auth retry counter carried alongside a single logical call.
#[derive(Debug, Clone, Copy, Default)]
pub struct RetryBudget {
    auth_retries: u8,
}

impl RetryBudget {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume one auth retry. Returns false once the budget is spent.
    pub fn try_auth_retry(&mut self) -> bool {
        if self.auth_retries >= MAX_AUTH_RETRIES {
            return false;
        }
        self.auth_retries += 1;
        true
    }

    pub fn auth_retries(&self) -> u8 {
        self.auth_retries
    }
}

/// A call to issue through `ApiClient`. Paths are relative to the API base.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    pub auth: AuthPolicy,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            auth: AuthPolicy::default(),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Attach a JSON body. The body is serialized once up front so the
    /// call can be re-sent unchanged on retry.
    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self, ApiError> {
        let value = serde_json::to_value(body)
            .map_err(|e| ApiError::InvalidRequest(format!("Failed to serialize request body: {}", e)))?;
        self.body = Some(value);
        Ok(self)
    }

    pub fn allow_anonymous(mut self) -> Self {
        self.auth = AuthPolicy::AnonymousFallback;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_budget_is_bounded_at_one() {
        let mut budget = RetryBudget::new();
        assert!(budget.try_auth_retry());
        assert_eq!(budget.auth_retries(), 1);
        assert!(!budget.try_auth_retry());
        assert!(!budget.try_auth_retry());
        assert_eq!(budget.auth_retries(), MAX_AUTH_RETRIES);
    }

    #[test]
    fn test_builder() {
        let req = ApiRequest::patch("contact-messages/4/")
            .json(&serde_json::json!({ "is_read": true }))
            .unwrap()
            .query("page", "2");

        assert_eq!(req.method, Method::PATCH);
        assert_eq!(req.path, "contact-messages/4/");
        assert_eq!(req.body, Some(serde_json::json!({ "is_read": true })));
        assert_eq!(req.query, vec![("page".to_string(), "2".to_string())]);
        assert_eq!(req.auth, AuthPolicy::Required);

        let req = ApiRequest::get("cart/").allow_anonymous();
        assert_eq!(req.auth, AuthPolicy::AnonymousFallback);
    }

    #[test]
    fn test_unserializable_body_is_a_request_error() {
        // JSON object keys must be strings
        let body: std::collections::HashMap<(u8, u8), u8> = [((1, 2), 3)].into_iter().collect();
        let err = ApiRequest::post("cart/").json(&body).unwrap_err();
        assert!(matches!(err, ApiError::InvalidRequest(_)), "got {err:?}");
    }
}
