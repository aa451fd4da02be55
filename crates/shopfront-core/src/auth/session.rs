use std::sync::{Arc, Mutex, PoisonError, RwLock};

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use tracing::{debug, info, warn};

use super::credentials::{Credentials, Profile, SessionState};
use super::store::{CredentialKey, CredentialStore, StoreError};
use crate::api::{ApiError, AuthApi, RefreshedTokens, TokenProvider};

type RefreshFlight = Shared<BoxFuture<'static, bool>>;

/// Owns the session state machine and is the only writer of credentials.
///
/// Cheap to clone: clones share the same credentials and refresh slot.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    api: AuthApi,
    store: Arc<dyn CredentialStore>,
    credentials: RwLock<Credentials>,
    /// The refresh currently in flight, if any. Callers that find it set
    /// await the same outcome instead of issuing their own refresh.
    refresh_flight: Mutex<Option<RefreshFlight>>,
}

/// Empties the refresh slot when the refresh future finishes or unwinds.
struct FlightGuard {
    inner: Arc<SessionInner>,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        *self
            .inner
            .refresh_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl Session {
    /// Create a session, restoring whatever credentials the store holds.
    /// No network calls are made; see `initialize`.
    pub fn new(api: AuthApi, store: Arc<dyn CredentialStore>) -> Self {
        let credentials = Credentials::load(store.as_ref());
        debug!(state = ?credentials.state(), has_profile = credentials.user.is_some(), "Session loaded");

        Self {
            inner: Arc::new(SessionInner {
                api,
                store,
                credentials: RwLock::new(credentials),
                refresh_flight: Mutex::new(None),
            }),
        }
    }

    // ===== Read access =====

    pub fn credentials(&self) -> Credentials {
        self.read().clone()
    }

    pub fn access_token(&self) -> Option<String> {
        self.read().access_token.clone()
    }

    fn refresh_token(&self) -> Option<String> {
        self.read().refresh_token.clone()
    }

    pub fn state(&self) -> SessionState {
        self.read().state()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state() == SessionState::Authenticated
    }

    pub fn current_profile(&self) -> Option<Profile> {
        self.read().user.clone()
    }

    /// Whether the logged in user may use the back office
    pub fn is_privileged(&self) -> bool {
        self.read().user.as_ref().is_some_and(|u| u.is_privileged)
    }

    pub fn is_refreshing(&self) -> bool {
        self.inner
            .refresh_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    // ===== Transitions =====

    /// Log in and persist the token pair and profile. Returns false on any
    /// failure, leaving the previous session untouched.
    pub async fn login(&self, username: &str, password: &str) -> bool {
        match self.try_login(username, password).await {
            Ok(_) => true,
            Err(e) => {
                warn!(username, error = %e, "Login failed");
                false
            }
        }
    }

    /// Same as `login`, but reports why it failed.
    pub async fn try_login(&self, username: &str, password: &str) -> Result<Profile, ApiError> {
        let tokens = self.inner.api.login(username, password).await?;

        // Fetch the profile before anything is persisted so a failure here
        // cannot leave a half-written session behind.
        let profile = self.inner.api.fetch_user(&tokens.access).await?;

        let next = Credentials {
            access_token: Some(tokens.access),
            refresh_token: Some(tokens.refresh),
            user: Some(profile.clone()),
        };

        {
            // Held across the store writes so a concurrent refresh or
            // logout sees either the old session or the new one.
            let mut creds = self.write();
            if let Err(e) = self.persist(&next) {
                warn!(error = %e, "Failed to persist login, restoring previous credentials");
                if let Err(restore_err) = self.persist(&creds) {
                    warn!(error = %restore_err, "Failed to restore previous credentials");
                }
                return Err(e.into());
            }
            *creds = next;
        }
        info!(username = %profile.username, privileged = profile.is_privileged, "Logged in");
        Ok(profile)
    }

    /// Fetch the current user with the stored access token and cache it.
    pub async fn fetch_user(&self) -> Result<Profile, ApiError> {
        let access = self.access_token().ok_or(ApiError::Unauthenticated)?;
        let profile = self.inner.api.fetch_user(&access).await?;

        let mut creds = self.write();
        // A logout or a newer login while the call was in flight wins
        if creds.access_token.as_deref() != Some(access.as_str()) {
            debug!("Session changed during profile fetch, discarding profile");
            return Err(ApiError::Unauthenticated);
        }
        if let Err(e) = self.persist_profile(&profile) {
            warn!(error = %e, "Failed to persist user profile");
        }
        creds.user = Some(profile.clone());
        Ok(profile)
    }

    /// Exchange the refresh token for a new access token.
    ///
    /// Single-flight: while one refresh is in progress, every other caller
    /// awaits that same refresh and gets its outcome. Returns false
    /// immediately, without a backend call, when there is no refresh token.
    pub async fn refresh(&self) -> bool {
        if self.refresh_token().is_none() {
            debug!("No refresh token, cannot refresh");
            return false;
        }

        let flight = {
            let mut slot = self
                .inner
                .refresh_flight
                .lock()
                .unwrap_or_else(PoisonError::into_inner);

            match slot.clone() {
                Some(flight) => {
                    debug!("Joining refresh already in flight");
                    flight
                }
                None => {
                    let session = self.clone();
                    let guard = FlightGuard {
                        inner: Arc::clone(&self.inner),
                    };
                    let flight = async move {
                        let _guard = guard;
                        session.run_refresh().await
                    }
                    .boxed()
                    .shared();
                    *slot = Some(flight.clone());
                    flight
                }
            }
        };

        flight.await
    }

    async fn run_refresh(&self) -> bool {
        let Some(refresh_token) = self.refresh_token() else {
            return false;
        };

        match self.inner.api.refresh(&refresh_token).await {
            Ok(tokens) => self.apply_refresh(&refresh_token, tokens),
            Err(ApiError::RefreshRejected) => {
                if self.end_session_if_current(&refresh_token) {
                    warn!("Refresh token rejected, ending session");
                    false
                } else {
                    debug!("Session changed during refresh, ignoring rejection");
                    self.access_token().is_some()
                }
            }
            Err(e) => {
                // Transport or server trouble says nothing about the
                // refresh token itself, so the session is kept.
                warn!(error = %e, "Token refresh failed");
                false
            }
        }
    }

    fn apply_refresh(&self, used: &str, tokens: RefreshedTokens) -> bool {
        let rotated = tokens.refresh.is_some();
        let mut creds = self.write();
        if creds.refresh_token.as_deref() != Some(used) {
            debug!("Session changed during refresh, discarding refreshed tokens");
            return creds.access_token.is_some();
        }

        let persisted = self
            .inner
            .store
            .set(CredentialKey::Access, &tokens.access)
            .and_then(|_| match tokens.refresh {
                Some(ref refresh) => self.inner.store.set(CredentialKey::Refresh, refresh),
                None => Ok(()),
            });
        if let Err(e) = persisted {
            warn!(error = %e, "Failed to persist refreshed tokens");
        }

        creds.access_token = Some(tokens.access);
        if let Some(refresh) = tokens.refresh {
            creds.refresh_token = Some(refresh);
        }
        info!(rotated, "Access token refreshed");
        true
    }

    /// End the session after its refresh token was rejected, unless a
    /// logout or a new login replaced that token in the meantime.
    fn end_session_if_current(&self, rejected: &str) -> bool {
        let mut creds = self.write();
        if creds.refresh_token.as_deref() != Some(rejected) {
            return false;
        }
        self.clear(&mut creds);
        true
    }

    /// Restore the session at process start.
    ///
    /// Validates the stored access token by fetching the profile. If the
    /// token was rejected, refreshes once and tries again. Returns whether
    /// an authenticated session was established.
    pub async fn initialize(&self) -> bool {
        {
            let creds = self.read();
            if creds.access_token.is_none() && creds.refresh_token.is_none() {
                debug!("No stored session");
                return false;
            }
        }

        match self.fetch_user().await {
            Ok(profile) => {
                info!(username = %profile.username, "Session restored");
                true
            }
            Err(ApiError::TokenRejected | ApiError::Unauthenticated) => {
                if !self.refresh().await {
                    // Keep the session only if the refresh token survived,
                    // i.e. the refresh failed for reasons other than rejection.
                    if self.refresh_token().is_none() {
                        self.logout();
                    }
                    return false;
                }
                match self.fetch_user().await {
                    Ok(profile) => {
                        info!(username = %profile.username, "Session restored after refresh");
                        true
                    }
                    Err(e) => {
                        warn!(error = %e, "Profile fetch failed after refresh");
                        false
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "Could not validate stored session");
                false
            }
        }
    }

    /// Clear all credentials in memory and in the store. Safe to call when
    /// already logged out.
    pub fn logout(&self) {
        let mut creds = self.write();
        self.clear(&mut creds);
    }

    /// Empty the given credentials and every store entry. The caller holds
    /// the write lock for the whole operation.
    fn clear(&self, creds: &mut Credentials) {
        let previous = std::mem::take(creds);
        if previous.is_empty() {
            debug!("Logout requested with no active session");
        } else {
            info!("Logged out");
        }

        for key in CredentialKey::ALL {
            if let Err(e) = self.inner.store.delete(key) {
                warn!(key = %key, error = %e, "Failed to remove stored credential");
            }
        }
    }

    // ===== Persistence =====

    fn persist(&self, creds: &Credentials) -> Result<(), StoreError> {
        let store = &self.inner.store;
        match creds.access_token {
            Some(ref token) => store.set(CredentialKey::Access, token)?,
            None => store.delete(CredentialKey::Access)?,
        }
        match creds.refresh_token {
            Some(ref token) => store.set(CredentialKey::Refresh, token)?,
            None => store.delete(CredentialKey::Refresh)?,
        }
        match creds.user {
            Some(ref profile) => self.persist_profile(profile)?,
            None => store.delete(CredentialKey::User)?,
        }
        Ok(())
    }

    fn persist_profile(&self, profile: &Profile) -> Result<(), StoreError> {
        let raw = serde_json::to_string(profile)
            .map_err(|e| StoreError::Serialize(CredentialKey::User, e))?;
        self.inner.store.set(CredentialKey::User, &raw)
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Credentials> {
        self.inner
            .credentials
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Credentials> {
        self.inner
            .credentials
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl TokenProvider for Session {
    fn access_token(&self) -> Option<String> {
        Session::access_token(self)
    }

    async fn refresh_access(&self) -> bool {
        self.refresh().await
    }
}
