//! Logging setup for binaries embedding the engine.
//!
//! Library code logs through the `log` facade; this installs a `tracing`
//! subscriber and forwards `log` records into it.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::error::LinkedAgentError;

/// Selects the output format with `LINKEDAGENT_LOG_FORMAT=json`.
pub const LOG_FORMAT_ENV: &str = "LINKEDAGENT_LOG_FORMAT";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Plain,
    Json,
}

impl LogFormat {
    pub fn from_env() -> Self {
        match std::env::var(LOG_FORMAT_ENV) {
            Ok(value) if value.eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Plain,
        }
    }
}

/// Installs the global subscriber. Filtering follows `RUST_LOG`, default `info`.
///
/// Fails if a global subscriber or logger is already installed.
pub fn init_logging(format: LogFormat) -> Result<(), LinkedAgentError> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let result = match format {
        LogFormat::Json => tracing::subscriber::set_global_default(
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_target(true)),
        ),
        LogFormat::Plain => tracing::subscriber::set_global_default(
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_target(true)),
        ),
    };
    result.map_err(|e| LinkedAgentError::Logging(e.to_string()))?;

    tracing_log::LogTracer::init().map_err(|e| LinkedAgentError::Logging(e.to_string()))?;

    tracing::debug!(format = ?format, "Logging initialized");
    Ok(())
}
