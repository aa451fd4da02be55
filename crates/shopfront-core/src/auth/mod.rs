//! Authentication module for managing user sessions and credentials.
//!
//! This module provides:
//! - `Session`: login, restore-on-start, single-flight token refresh, logout
//! - `CredentialStore`: durable storage for tokens and the cached profile,
//!   backed by files, the OS keychain, or memory
//!
//! The session is the only writer of stored credentials.

pub mod credentials;
pub mod session;
pub mod store;

pub use credentials::{Credentials, Profile, SessionState};
pub use session::Session;
pub use store::{CredentialKey, CredentialStore, FileStore, KeyringStore, MemoryStore, StoreError};
