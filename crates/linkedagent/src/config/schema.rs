use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Engine settings, read from a camelCase JSON file. Every field is optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    #[serde(default = "default_reconnect_backoff_ms")]
    pub reconnect_backoff_ms: u64,

    /// Updates a slow subscriber may fall behind before it must resync.
    #[serde(default = "default_update_channel_capacity")]
    pub update_channel_capacity: usize,

    #[serde(default = "default_success_ratio")]
    pub success_ratio: f64,

    #[serde(default = "default_progress_delta_min")]
    pub progress_delta_min: u64,

    #[serde(default = "default_progress_delta_max")]
    pub progress_delta_max: u64,

    #[serde(default = "default_page_size")]
    pub default_page_size: u32,

    /// Where the session token is persisted. `None` uses the platform data dir.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_path: Option<PathBuf>,
}

fn default_api_base_url() -> String {
    "https://api.linkedagent.com/v1".to_string()
}

fn default_tick_interval_ms() -> u64 {
    2000
}

fn default_reconnect_backoff_ms() -> u64 {
    3000
}

fn default_update_channel_capacity() -> usize {
    100
}

fn default_success_ratio() -> f64 {
    0.9
}

fn default_progress_delta_min() -> u64 {
    10
}

fn default_progress_delta_max() -> u64 {
    59
}

fn default_page_size() -> u32 {
    20
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            tick_interval_ms: default_tick_interval_ms(),
            reconnect_backoff_ms: default_reconnect_backoff_ms(),
            update_channel_capacity: default_update_channel_capacity(),
            success_ratio: default_success_ratio(),
            progress_delta_min: default_progress_delta_min(),
            progress_delta_max: default_progress_delta_max(),
            default_page_size: default_page_size(),
            credential_path: None,
        }
    }
}

impl Settings {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_millis(self.reconnect_backoff_ms)
    }
}
