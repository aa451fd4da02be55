//! Durable key/value persistence for session credentials.
//!
//! Three independent entries are kept: the access token, the refresh
//! token and the serialized user profile. A missing entry is a valid
//! state, so reads never fail.

use std::collections::HashMap;
use std::fmt;
#[cfg(unix)]
use std::fs::OpenOptions;
#[cfg(unix)]
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use keyring::Entry;
use thiserror::Error;
use tracing::warn;

/// Keyring service name for stored credentials
const SERVICE_NAME: &str = "shopfront";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CredentialKey {
    Access,
    Refresh,
    User,
}

impl CredentialKey {
    pub const ALL: [CredentialKey; 3] =
        [CredentialKey::Access, CredentialKey::Refresh, CredentialKey::User];

    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialKey::Access => "access",
            CredentialKey::Refresh => "refresh",
            CredentialKey::User => "user",
        }
    }
}

impl fmt::Display for CredentialKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to write credential file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Keychain error for '{key}': {source}")]
    Keyring {
        key: CredentialKey,
        #[source]
        source: keyring::Error,
    },

    #[error("Failed to serialize {0}: {1}")]
    Serialize(CredentialKey, #[source] serde_json::Error),
}

/// Pass-through persistence used by the session manager.
///
/// Implementations must treat unreadable values as absent.
pub trait CredentialStore: Send + Sync {
    fn get(&self, key: CredentialKey) -> Option<String>;

    fn set(&self, key: CredentialKey, value: &str) -> Result<(), StoreError>;

    /// Removing an entry that does not exist succeeds.
    fn delete(&self, key: CredentialKey) -> Result<(), StoreError>;
}

// ============================================================================
// File backend
// ============================================================================

/// Stores each credential in its own file under a directory.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn path(&self, key: CredentialKey) -> PathBuf {
        self.dir.join(key.as_str())
    }
}

impl CredentialStore for FileStore {
    fn get(&self, key: CredentialKey) -> Option<String> {
        let path = self.path(key);
        match std::fs::read_to_string(&path) {
            Ok(contents) if !contents.is_empty() => Some(contents),
            Ok(_) => None,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!(key = %key, error = %e, "Unreadable credential file, treating as absent");
                None
            }
        }
    }

    fn set(&self, key: CredentialKey, value: &str) -> Result<(), StoreError> {
        std::fs::create_dir_all(&self.dir).map_err(|source| StoreError::Io {
            path: self.dir.clone(),
            source,
        })?;

        // Write to a sibling file and rename so readers never see a partial value
        let path = self.path(key);
        let tmp = self.dir.join(format!(".{}.tmp", key.as_str()));
        write_private(&tmp, value)
            .and_then(|_| std::fs::rename(&tmp, &path))
            .map_err(|source| StoreError::Io { path, source })
    }

    fn delete(&self, key: CredentialKey) -> Result<(), StoreError> {
        let path = self.path(key);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StoreError::Io { path, source }),
        }
    }
}

/// Write a credential file readable only by the owner (0600 on unix).
fn write_private(path: &Path, value: &str) -> std::io::Result<()> {
    // A leftover temp file would keep its old mode
    let _ = std::fs::remove_file(path);

    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(0o600)
            .open(path)?;
        file.write_all(value.as_bytes())
    }

    #[cfg(not(unix))]
    {
        std::fs::write(path, value)
    }
}

// ============================================================================
// Keyring backend
// ============================================================================

/// Stores credentials in the OS keychain, one entry per key.
pub struct KeyringStore {
    service: String,
}

impl KeyringStore {
    pub fn new() -> Self {
        Self::with_service(SERVICE_NAME)
    }

    pub fn with_service(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, key: CredentialKey) -> Result<Entry, StoreError> {
        Entry::new(&self.service, key.as_str())
            .map_err(|source| StoreError::Keyring { key, source })
    }
}

impl Default for KeyringStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialStore for KeyringStore {
    fn get(&self, key: CredentialKey) -> Option<String> {
        let entry = self.entry(key).ok()?;
        match entry.get_password() {
            Ok(value) => Some(value),
            Err(keyring::Error::NoEntry) => None,
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to read from keychain, treating as absent");
                None
            }
        }
    }

    fn set(&self, key: CredentialKey, value: &str) -> Result<(), StoreError> {
        self.entry(key)?
            .set_password(value)
            .map_err(|source| StoreError::Keyring { key, source })
    }

    fn delete(&self, key: CredentialKey) -> Result<(), StoreError> {
        match self.entry(key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(source) => Err(StoreError::Keyring { key, source }),
        }
    }
}

// ============================================================================
// In-memory backend
// ============================================================================

/// Process-local store. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<CredentialKey, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }
}

impl CredentialStore for MemoryStore {
    fn get(&self, key: CredentialKey) -> Option<String> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .cloned()
    }

    fn set(&self, key: CredentialKey, value: &str) -> Result<(), StoreError> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, value.to_string());
        Ok(())
    }

    fn delete(&self, key: CredentialKey) -> Result<(), StoreError> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&key);
        Ok(())
    }
}
