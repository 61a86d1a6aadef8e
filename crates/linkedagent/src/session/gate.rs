//! Single-token session gate in front of every authenticated operation.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use secrecy::{ExposeSecret, SecretString};
use tokio::sync::watch;

use crate::error::ApiError;
use crate::session::authenticator::Authenticator;
use crate::session::credentials::CredentialStore;

/// Holds the current session token and guards every authenticated operation.
pub struct SessionGate {
    authenticator: Box<dyn Authenticator>,
    credentials: Option<CredentialStore>,
    token: RwLock<Option<SecretString>>,
    state: watch::Sender<bool>,
}

impl SessionGate {
    pub fn new(authenticator: impl Authenticator + 'static) -> Self {
        let (state, _) = watch::channel(false);
        Self {
            authenticator: Box::new(authenticator),
            credentials: None,
            token: RwLock::new(None),
            state,
        }
    }

    /// Persists the token across restarts in `store`.
    pub fn with_credentials(mut self, store: CredentialStore) -> Self {
        self.credentials = Some(store);
        self
    }

    /// Loads a previously persisted token. Returns whether a session was restored.
    pub fn restore(&self) -> bool {
        let Some(ref store) = self.credentials else {
            return false;
        };
        match store.load() {
            Ok(Some(token)) => {
                *self.write_token() = Some(token);
                self.state.send_replace(true);
                log::info!("Restored session from {}", store.path().display());
                true
            }
            Ok(None) => false,
            Err(e) => {
                log::warn!("Could not restore session: {}", e);
                false
            }
        }
    }

    /// Authenticates and starts a session, returning the issued token.
    ///
    /// Failing to persist the token does not fail the login.
    pub fn login(&self, email: &str, password: &str) -> Result<SecretString, ApiError> {
        if email.trim().is_empty() || !email.contains('@') {
            return Err(ApiError::validation("a valid email address is required"));
        }
        if password.is_empty() {
            return Err(ApiError::validation("password must not be empty"));
        }

        let password = SecretString::from(password.to_string());
        let token = match self.authenticator.authenticate(email, &password) {
            Ok(token) => token,
            Err(e) => {
                log::warn!("Login failed for {}: {}", email.trim(), e);
                return Err(e);
            }
        };

        if let Some(ref store) = self.credentials {
            if let Err(e) = store.save(&token) {
                log::warn!("Failed to persist session token: {}", e);
            }
        }

        let issued = SecretString::from(token.expose_secret().to_string());
        *self.write_token() = Some(token);
        self.state.send_replace(true);
        log::info!("Logged in as {}", email.trim());
        Ok(issued)
    }

    pub fn is_authenticated(&self) -> bool {
        self.read_token().is_some()
    }

    pub fn ensure_authenticated(&self) -> Result<(), ApiError> {
        if self.is_authenticated() {
            Ok(())
        } else {
            Err(ApiError::Unauthorized)
        }
    }

    /// Copy of the current token, if logged in.
    pub fn token(&self) -> Option<SecretString> {
        self.read_token()
            .as_ref()
            .map(|token| SecretString::from(token.expose_secret().to_string()))
    }

    /// Observes every session start and end; `true` while logged in.
    pub fn session_state(&self) -> watch::Receiver<bool> {
        self.state.subscribe()
    }

    pub fn logout(&self) {
        if self.end_session() {
            log::info!("Logged out");
        }
    }

    /// Drops a session the server no longer accepts.
    pub fn expire(&self) {
        if self.end_session() {
            log::warn!("Session expired, login required");
        }
    }

    fn end_session(&self) -> bool {
        let had_session = self.write_token().take().is_some();
        if had_session {
            self.state.send_replace(false);
        }
        if let Some(ref store) = self.credentials {
            if let Err(e) = store.clear() {
                log::warn!("Failed to clear persisted session token: {}", e);
            }
        }
        had_session
    }

    fn read_token(&self) -> RwLockReadGuard<'_, Option<SecretString>> {
        match self.token.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Session lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write_token(&self) -> RwLockWriteGuard<'_, Option<SecretString>> {
        match self.token.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Session lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}
