//! Builders for test data.

#![allow(dead_code)]

use std::path::Path;

use linkedagent::Settings;

/// Builder for `Settings` with fast timings suitable for paused-clock tests.
pub struct SettingsBuilder {
    settings: Settings,
}

impl SettingsBuilder {
    pub fn new(credential_dir: &Path) -> Self {
        Self {
            settings: Settings {
                api_base_url: "https://api.example.test/v1".to_string(),
                credential_path: Some(credential_dir.join("credentials.json")),
                ..Settings::default()
            },
        }
    }

    pub fn tick_interval_ms(mut self, ms: u64) -> Self {
        self.settings.tick_interval_ms = ms;
        self
    }

    pub fn reconnect_backoff_ms(mut self, ms: u64) -> Self {
        self.settings.reconnect_backoff_ms = ms;
        self
    }

    pub fn update_channel_capacity(mut self, capacity: usize) -> Self {
        self.settings.update_channel_capacity = capacity;
        self
    }

    pub fn build(self) -> Settings {
        self.settings
    }
}

/// A CSV upload with a header row and `count` profile URLs.
pub fn url_list(count: usize) -> String {
    let mut list = String::from("profile_url,name\n");
    for i in 0..count {
        list.push_str(&format!("https://www.linkedin.com/in/person-{},Person {}\n", i, i));
    }
    list
}
