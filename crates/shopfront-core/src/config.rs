//! Application configuration management.
//!
//! This module handles loading and saving the client configuration, which
//! includes the API base URL, the credential storage backend and the last
//! used username.
//!
//! Configuration is stored at `~/.config/shopfront/config.json`.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::api::{normalize_base_url, ApiError};

/// Application name used for config/data directory paths
const APP_NAME: &str = "shopfront";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Backend used when neither config nor environment names one
pub const DEFAULT_API_BASE_URL: &str = "http://127.0.0.1:8000/api";

/// Environment variable overriding the API base URL
pub const API_URL_ENV: &str = "SHOPFRONT_API_URL";

/// HTTP request timeout in seconds.
/// 30s allows for slow API responses while failing fast enough for good UX.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    File,
    Keyring,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub api_base_url: Option<String>,
    pub last_username: Option<String>,
    pub credential_backend: Option<StoreBackend>,
    pub request_timeout_secs: Option<u64>,
    pub rate_limit_retries: Option<u32>,
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            Ok(serde_json::from_str(&contents)?)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Directory for the file credential backend
    pub fn data_dir(&self) -> Result<PathBuf> {
        let data_dir = dirs::data_local_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }

    /// Resolve the API base URL: environment, then config, then default.
    pub fn api_base_url(&self) -> Result<Url, ApiError> {
        let env = std::env::var(API_URL_ENV).ok().filter(|v| !v.trim().is_empty());
        self.resolve_base_url(env.as_deref())
    }

    fn resolve_base_url(&self, env_override: Option<&str>) -> Result<Url, ApiError> {
        let raw = env_override
            .or(self.api_base_url.as_deref())
            .unwrap_or(DEFAULT_API_BASE_URL);
        normalize_base_url(raw)
    }

    pub fn backend(&self) -> StoreBackend {
        self.credential_backend.unwrap_or_default()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.backend(), StoreBackend::File);
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(
            config.resolve_base_url(None).unwrap().as_str(),
            "http://127.0.0.1:8000/api/"
        );
    }

    #[test]
    fn test_env_override_wins_over_config() {
        let config = Config {
            api_base_url: Some("https://shop.example.com/api".into()),
            ..Config::default()
        };
        assert_eq!(
            config.resolve_base_url(None).unwrap().as_str(),
            "https://shop.example.com/api/"
        );
        assert_eq!(
            config.resolve_base_url(Some("http://localhost:9000/api")).unwrap().as_str(),
            "http://localhost:9000/api/"
        );
    }

    #[test]
    fn test_parse_config_file() {
        let json = r#"{"api_base_url": "https://shop.example.com/api", "credential_backend": "keyring", "last_username": "admin"}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.backend(), StoreBackend::Keyring);
        assert_eq!(config.last_username.as_deref(), Some("admin"));
        assert_eq!(config.rate_limit_retries, None);
    }

    #[test]
    fn test_credential_files_live_in_app_data_dir() {
        let Ok(dir) = Config::default().data_dir() else {
            return;
        };
        assert!(dir.ends_with(APP_NAME), "unexpected data dir {}", dir.display());
    }
}
