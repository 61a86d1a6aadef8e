pub mod loader;
pub mod schema;

pub use loader::{default_settings, load_settings, load_settings_from_str, API_BASE_URL_ENV};
pub use schema::Settings;
