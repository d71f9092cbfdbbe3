// Layered configuration: defaults, optional config.toml, then APP__* environment variables

use std::time::Duration;

use anyhow::Result;
use config::{Config, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub server_address: String,
    // Directory holding the pre-built front-end bundle
    pub static_dir: String,
    pub store: StoreSettings,
    pub editor: EditorSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreSettings {
    // Base URL of the hosted backend; unset means the in-memory store is used
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub bucket: String,
    pub proxy_url: Option<String>,
    // 0 disables the polling change feed
    pub poll_interval_secs: u64,
    // Upper bound for any single HTTP request to the backend
    pub request_timeout_secs: u64,
}

impl StoreSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EditorSettings {
    pub debounce_ms: u64,
    // Also bounds the refetch that follows a change notification
    pub write_timeout_secs: u64,
}

impl EditorSettings {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }
}

impl Default for EditorSettings {
    fn default() -> Self {
        Self {
            debounce_ms: 1000,
            write_timeout_secs: 10,
        }
    }
}

impl Settings {
    pub fn new() -> Result<Self> {
        dotenv::dotenv().ok(); // Load .env file if present

        let builder = Config::builder()
            .set_default("server_address", "127.0.0.1:3000")?
            .set_default("static_dir", "static")?
            .set_default("store.bucket", "vehicle-images")?
            .set_default("store.poll_interval_secs", 5)?
            .set_default("store.request_timeout_secs", 30)?
            .set_default("editor.debounce_ms", 1000)?
            .set_default("editor.write_timeout_secs", 10)?
            .add_source(File::with_name("config").required(false))
            // e.g. APP__STORE__URL, APP__EDITOR__DEBOUNCE_MS
            .add_source(Environment::with_prefix("APP").prefix_separator("__").separator("__"));

        let settings: Settings = builder.build()?.try_deserialize()?;
        if settings.editor.debounce_ms == 0 {
            anyhow::bail!("editor.debounce_ms must be greater than zero");
        }
        if settings.store.request_timeout_secs == 0 {
            anyhow::bail!("store.request_timeout_secs must be greater than zero");
        }
        Ok(settings)
    }
}
