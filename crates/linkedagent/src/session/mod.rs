//! Session and authentication gate.

pub mod authenticator;
pub mod credentials;
pub mod gate;

pub use authenticator::{Authenticator, DemoAuthenticator, DEMO_EMAIL, DEMO_PASSWORD};
pub use credentials::{CredentialStore, TOKEN_KEY};
pub use gate::SessionGate;
