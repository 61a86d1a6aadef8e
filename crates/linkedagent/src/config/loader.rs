use std::path::Path;

use crate::config::schema::Settings;
use crate::error::ConfigError;
use crate::job::MAX_PAGE_SIZE;

/// Overrides `apiBaseUrl` when set.
pub const API_BASE_URL_ENV: &str = "LINKEDAGENT_API_BASE_URL";

pub fn load_settings<P: AsRef<Path>>(path: P) -> Result<Settings, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_settings_from_str(&content)
}

pub fn load_settings_from_str(content: &str) -> Result<Settings, ConfigError> {
    let settings: Settings = serde_json::from_str(content)?;
    finish(settings)
}

/// Defaults plus environment overrides, for running without a settings file.
pub fn default_settings() -> Result<Settings, ConfigError> {
    finish(Settings::default())
}

fn finish(mut settings: Settings) -> Result<Settings, ConfigError> {
    apply_env_overrides(&mut settings);
    validate_settings(&settings)?;
    Ok(settings)
}

fn apply_env_overrides(settings: &mut Settings) {
    if let Ok(url) = std::env::var(API_BASE_URL_ENV) {
        if !url.trim().is_empty() {
            log::debug!("Using {} from environment", API_BASE_URL_ENV);
            settings.api_base_url = url.trim().to_string();
        }
    }
}

fn validate_settings(settings: &Settings) -> Result<(), ConfigError> {
    let url = settings.api_base_url.as_str();
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(invalid(format!(
            "apiBaseUrl must be an http(s) URL, got '{}'",
            url
        )));
    }

    if settings.tick_interval_ms == 0 {
        return Err(invalid("tickIntervalMs must be greater than zero"));
    }
    if settings.reconnect_backoff_ms == 0 {
        return Err(invalid("reconnectBackoffMs must be greater than zero"));
    }
    if settings.update_channel_capacity == 0 {
        return Err(invalid("updateChannelCapacity must be greater than zero"));
    }

    if !(0.0..=1.0).contains(&settings.success_ratio) {
        return Err(invalid(format!(
            "successRatio must be within [0, 1], got {}",
            settings.success_ratio
        )));
    }

    if settings.progress_delta_min == 0 || settings.progress_delta_min > settings.progress_delta_max
    {
        return Err(invalid(format!(
            "progress delta range {}..={} is invalid",
            settings.progress_delta_min, settings.progress_delta_max
        )));
    }

    if settings.default_page_size == 0 || settings.default_page_size > MAX_PAGE_SIZE {
        return Err(invalid(format!(
            "defaultPageSize must be between 1 and {}",
            MAX_PAGE_SIZE
        )));
    }

    Ok(())
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    #[serial]
    fn test_empty_object_uses_defaults() {
        std::env::remove_var(API_BASE_URL_ENV);
        let settings = load_settings_from_str("{}").unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.tick_interval().as_millis(), 2000);
        assert_eq!(settings.reconnect_backoff().as_millis(), 3000);
        assert_eq!(settings.api_base_url, "https://api.linkedagent.com/v1");
    }

    #[test]
    #[serial]
    fn test_partial_override() {
        std::env::remove_var(API_BASE_URL_ENV);
        let settings =
            load_settings_from_str(r#"{"tickIntervalMs": 500, "successRatio": 0.5}"#).unwrap();
        assert_eq!(settings.tick_interval_ms, 500);
        assert_eq!(settings.success_ratio, 0.5);
        assert_eq!(settings.progress_delta_max, 59);
    }

    #[test]
    #[serial]
    fn test_rejects_invalid_values() {
        std::env::remove_var(API_BASE_URL_ENV);
        for json in [
            r#"{"tickIntervalMs": 0}"#,
            r#"{"successRatio": 1.5}"#,
            r#"{"progressDeltaMin": 60, "progressDeltaMax": 10}"#,
            r#"{"defaultPageSize": 500}"#,
            r#"{"apiBaseUrl": "ftp://nope"}"#,
            r#"{"updateChannelCapacity": 0}"#,
        ] {
            assert!(
                matches!(load_settings_from_str(json), Err(ConfigError::Validation { .. })),
                "accepted {}",
                json
            );
        }
        assert!(matches!(
            load_settings_from_str("{oops"),
            Err(ConfigError::ParseJson(_))
        ));
    }

    #[test]
    #[serial]
    fn test_env_override() {
        std::env::set_var(API_BASE_URL_ENV, "http://localhost:8080/v1");
        let settings = load_settings_from_str("{}").unwrap();
        std::env::remove_var(API_BASE_URL_ENV);
        assert_eq!(settings.api_base_url, "http://localhost:8080/v1");
    }

    #[test]
    #[serial]
    fn test_load_from_file() {
        std::env::remove_var(API_BASE_URL_ENV);
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"reconnectBackoffMs": 1000}}"#).unwrap();

        let settings = load_settings(file.path()).unwrap();
        assert_eq!(settings.reconnect_backoff_ms, 1000);

        assert!(matches!(
            load_settings("/definitely/not/here.json"),
            Err(ConfigError::ReadFile { .. })
        ));
    }
}
