use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use super::store::{CredentialKey, CredentialStore};

/// Authenticated user as returned by the backend's current-user endpoint.
///
/// Fields the client does not interpret are kept in `extra` so a stored
/// profile round-trips unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: i64,
    pub username: String,
    #[serde(rename = "is_staff", default)]
    pub is_privileged: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    LoggedOut,
    Authenticated,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Credentials {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub user: Option<Profile>,
}

impl Credentials {
    /// Read all three entries from the store. A stored profile that does
    /// not parse is treated as absent.
    pub fn load(store: &dyn CredentialStore) -> Self {
        let user = store.get(CredentialKey::User).and_then(|raw| {
            match serde_json::from_str::<Profile>(&raw) {
                Ok(profile) => Some(profile),
                Err(e) => {
                    warn!(error = %e, "Ignoring malformed stored profile");
                    None
                }
            }
        });

        Self {
            access_token: store.get(CredentialKey::Access),
            refresh_token: store.get(CredentialKey::Refresh),
            user,
        }
    }

    /// Session state is derived from the access token alone; it is never
    /// stored separately.
    pub fn state(&self) -> SessionState {
        if self.access_token.is_some() {
            SessionState::Authenticated
        } else {
            SessionState::LoggedOut
        }
    }

    pub fn is_empty(&self) -> bool {
        self.access_token.is_none() && self.refresh_token.is_none() && self.user.is_none()
    }
}
