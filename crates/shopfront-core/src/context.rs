//! The session context handed to every consumer.
//!
//! Built once at startup, it owns the `Session` and an `ApiClient` that
//! share one HTTP connection pool. Consumers issue calls through `api()`
//! and never attach or refresh tokens themselves.

use std::sync::Arc;

use anyhow::{Context, Result};
use reqwest::{Client, Url};
use tracing::debug;

use crate::api::{ApiClient, ApiError, AuthApi};
use crate::auth::{CredentialStore, FileStore, KeyringStore, Profile, Session};
use crate::config::{Config, StoreBackend};

#[derive(Clone)]
pub struct SessionContext {
    session: Session,
    api: ApiClient,
}

impl SessionContext {
    /// Wire the context from configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        let base_url = config.api_base_url().context("Invalid API base URL")?;

        let store: Arc<dyn CredentialStore> = match config.backend() {
            StoreBackend::File => Arc::new(FileStore::new(config.data_dir()?)),
            StoreBackend::Keyring => Arc::new(KeyringStore::new()),
        };
        debug!(%base_url, backend = ?config.backend(), "Building session context");

        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .context("Failed to build HTTP client")?;

        let mut context = Self::new(client, base_url, store);
        if let Some(retries) = config.rate_limit_retries {
            context.api = context.api.with_rate_limit_retries(retries);
        }
        Ok(context)
    }

    /// Wire the context from explicit parts
    pub fn new(client: Client, base_url: Url, store: Arc<dyn CredentialStore>) -> Self {
        let session = Session::new(AuthApi::new(client.clone(), base_url.clone()), store);
        let api = ApiClient::new(client, base_url, Arc::new(session.clone()));
        Self { session, api }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.is_authenticated()
    }

    pub fn current_profile(&self) -> Option<Profile> {
        self.session.current_profile()
    }

    pub async fn initialize(&self) -> bool {
        self.session.initialize().await
    }

    pub async fn login(&self, username: &str, password: &str) -> bool {
        self.session.login(username, password).await
    }

    pub async fn try_login(&self, username: &str, password: &str) -> Result<Profile, ApiError> {
        self.session.try_login(username, password).await
    }

    pub fn logout(&self) {
        self.session.logout();
    }
}
