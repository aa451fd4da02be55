//! Shared fixtures for tests that drive the session against a wiremock
//! backend.

#![allow(dead_code)]

use std::sync::Arc;

use reqwest::Url;
use serde_json::{json, Value};
use shopfront_core::auth::{CredentialKey, CredentialStore, MemoryStore};
use shopfront_core::SessionContext;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Match, Mock, MockServer, Request, ResponseTemplate};

pub fn base_url(server: &MockServer) -> Url {
    format!("{}/api/", server.uri()).parse().unwrap()
}

/// Context backed by an in-memory store the test can inspect.
pub fn context(server: &MockServer, store: &Arc<MemoryStore>) -> SessionContext {
    let store: Arc<dyn CredentialStore> = store.clone();
    SessionContext::new(reqwest::Client::new(), base_url(server), store)
}

/// Store pre-loaded as if a previous run had logged in.
pub fn stored_session(access: Option<&str>, refresh: Option<&str>) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    if let Some(access) = access {
        store.set(CredentialKey::Access, access).unwrap();
    }
    if let Some(refresh) = refresh {
        store.set(CredentialKey::Refresh, refresh).unwrap();
    }
    store
        .set(CredentialKey::User, &alice().to_string())
        .unwrap();
    store
}

pub fn alice() -> Value {
    json!({ "id": 1, "username": "alice", "is_staff": true })
}

pub fn bearer(token: &str) -> String {
    format!("Bearer {}", token)
}

/// The backend's 401 for an expired or invalid access token.
pub fn token_not_valid() -> ResponseTemplate {
    ResponseTemplate::new(401).set_body_json(json!({
        "detail": "Given token not valid for any token type",
        "code": "token_not_valid",
        "messages": [{
            "token_class": "AccessToken",
            "token_type": "access",
            "message": "Token is invalid or expired"
        }]
    }))
}

/// Matches requests that carry no Authorization header.
pub struct NoAuthorization;

impl Match for NoAuthorization {
    fn matches(&self, request: &Request) -> bool {
        !request.headers.contains_key("authorization")
    }
}

pub async fn mount_login(server: &MockServer, access: &str, refresh: &str) {
    Mock::given(method("POST"))
        .and(path("/api/auth/login/"))
        .and(body_json(json!({ "username": "alice", "password": "secret" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access": access,
            "refresh": refresh
        })))
        .mount(server)
        .await;
}

pub async fn mount_user(server: &MockServer, access: &str) {
    Mock::given(method("GET"))
        .and(path("/api/auth/user/"))
        .and(header("authorization", bearer(access).as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(alice()))
        .mount(server)
        .await;
}
