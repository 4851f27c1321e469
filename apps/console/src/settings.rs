use std::{fs, path::Path, time::Duration};

use anyhow::Context;
use serde::Deserialize;
use url::Url;

#[derive(Debug, Clone, PartialEq)]
pub struct ConsoleSettings {
    pub server_url: String,
    pub page_size: usize,
    pub filter_debounce_ms: u64,
    pub request_timeout_secs: u64,
}

impl Default for ConsoleSettings {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:8081/service/rest".into(),
            page_size: 25,
            filter_debounce_ms: 400,
            request_timeout_secs: 30,
        }
    }
}

/// Keys accepted in `console.toml`; anything missing keeps its default.
#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    server_url: Option<String>,
    page_size: Option<usize>,
    filter_debounce_ms: Option<u64>,
    request_timeout_secs: Option<u64>,
}

impl ConsoleSettings {
    pub fn filter_debounce(&self) -> Duration {
        Duration::from_millis(self.filter_debounce_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn base_url(&self) -> anyhow::Result<Url> {
        Url::parse(&self.server_url)
            .with_context(|| format!("invalid server url '{}'", self.server_url))
    }

    fn apply_file(&mut self, raw: &str) -> anyhow::Result<()> {
        let file: FileSettings = toml::from_str(raw)?;
        if let Some(v) = file.server_url {
            self.server_url = v;
        }
        if let Some(v) = file.page_size {
            self.page_size = v;
        }
        if let Some(v) = file.filter_debounce_ms {
            self.filter_debounce_ms = v;
        }
        if let Some(v) = file.request_timeout_secs {
            self.request_timeout_secs = v;
        }
        Ok(())
    }

    /// Later keys win; numbers that do not parse are ignored.
    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(v) = var("CONSOLE_SERVER_URL") {
            self.server_url = v;
        }
        if let Some(v) = var("APP__SERVER_URL") {
            self.server_url = v;
        }

        if let Some(v) = var("APP__PAGE_SIZE").and_then(|v| v.parse().ok()) {
            self.page_size = v;
        }
        if let Some(v) = var("APP__FILTER_DEBOUNCE_MS").and_then(|v| v.parse().ok()) {
            self.filter_debounce_ms = v;
        }
        if let Some(v) = var("APP__REQUEST_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            self.request_timeout_secs = v;
        }
    }
}

/// Defaults, then `path` if it exists, then environment overrides.
pub fn load_settings(path: &Path) -> anyhow::Result<ConsoleSettings> {
    let mut settings = ConsoleSettings::default();

    if let Ok(raw) = fs::read_to_string(path) {
        settings
            .apply_file(&raw)
            .with_context(|| format!("failed to parse settings file '{}'", path.display()))?;
    }
    settings.apply_env(|key| std::env::var(key).ok());

    Ok(settings)
}

#[cfg(test)]
#[path = "tests/settings_tests.rs"]
mod tests;
