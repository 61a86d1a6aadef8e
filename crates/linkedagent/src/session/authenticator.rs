//! Credential checking.

use secrecy::{ExposeSecret, SecretString};
use uuid::Uuid;

use crate::error::ApiError;

pub const DEMO_EMAIL: &str = "demo@linkedagent.com";
pub const DEMO_PASSWORD: &str = "demo123";

/// Exchanges an email and password for a bearer token.
pub trait Authenticator: Send + Sync {
    fn authenticate(&self, email: &str, password: &SecretString) -> Result<SecretString, ApiError>;
}

/// Accepts a single fixed account and issues random opaque tokens.
pub struct DemoAuthenticator {
    email: String,
    password: SecretString,
}

impl DemoAuthenticator {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: SecretString::from(password.into()),
        }
    }
}

impl Default for DemoAuthenticator {
    fn default() -> Self {
        Self::new(DEMO_EMAIL, DEMO_PASSWORD)
    }
}

impl Authenticator for DemoAuthenticator {
    fn authenticate(&self, email: &str, password: &SecretString) -> Result<SecretString, ApiError> {
        let email_matches = email.trim().eq_ignore_ascii_case(&self.email);
        if !email_matches || password.expose_secret() != self.password.expose_secret() {
            return Err(ApiError::InvalidCredentials);
        }
        Ok(SecretString::from(format!("la_{}", Uuid::new_v4().simple())))
    }
}
