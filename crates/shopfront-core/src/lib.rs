//! Shopfront core - session lifecycle and authenticated API access for the
//! storefront and back office.
//!
//! - `auth`: credential storage and the session state machine
//! - `api`: the request pipeline that attaches tokens and refreshes them
//! - `config`: client configuration
//! - `context`: the `SessionContext` shared by all consumers

pub mod api;
pub mod auth;
pub mod config;
pub mod context;

pub use api::{ApiClient, ApiError, ApiRequest, AuthPolicy};
pub use auth::{CredentialStore, Credentials, Profile, Session, SessionState};
pub use config::Config;
pub use context::SessionContext;
