//! Configuration management for docsync using the prefer crate.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::services::SyncTimings;

/// Default API base URL.
const DEFAULT_API_BASE_URL: &str = "http://localhost:3000/api";

/// Application settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Base URL of the document API.
    pub api_base_url: String,
    /// Bearer token for the document API.
    pub api_token: Option<String>,
    /// Request timeout in seconds.
    pub request_timeout: u64,
    /// Quiet period before a save, in milliseconds.
    pub save_debounce_ms: u64,
    /// Pulls are suppressed this long after an edit, in milliseconds.
    pub edit_grace_ms: u64,
    /// Seconds between background statistics pulls.
    pub pull_interval_secs: u64,
    /// Seconds between auto-version checks.
    pub auto_version_interval_secs: u64,
    /// Longest wait for the editor to renumber citations, in milliseconds.
    pub renumber_settle_timeout_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            api_token: None,
            request_timeout: 30,
            save_debounce_ms: 2000,
            edit_grace_ms: 2500,
            pull_interval_secs: 30,
            auto_version_interval_secs: 300,
            renumber_settle_timeout_ms: 2000,
        }
    }
}

impl Settings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    pub fn timings(&self) -> SyncTimings {
        SyncTimings::from(self)
    }

    /// Apply `DOCSYNC_*` overrides read through `lookup`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|s| !s.is_empty());
        let number = |name: &str| {
            var(name).and_then(|s| match s.parse::<u64>() {
                Ok(n) => Some(n),
                Err(_) => {
                    tracing::warn!("Ignoring {}: '{}' is not a number", name, s);
                    None
                }
            })
        };

        if let Some(url) = var("DOCSYNC_API_URL") {
            tracing::debug!("Using DOCSYNC_API_URL from environment: {}", url);
            self.api_base_url = url;
        }
        if let Some(token) = var("DOCSYNC_API_TOKEN") {
            self.api_token = Some(token);
        }
        if let Some(timeout) = number("DOCSYNC_REQUEST_TIMEOUT") {
            self.request_timeout = timeout;
        }
        if let Some(ms) = number("DOCSYNC_SAVE_DEBOUNCE_MS") {
            self.save_debounce_ms = ms;
        }
        if let Some(ms) = number("DOCSYNC_EDIT_GRACE_MS") {
            self.edit_grace_ms = ms;
        }
        if let Some(secs) = number("DOCSYNC_PULL_INTERVAL_SECS") {
            self.pull_interval_secs = secs;
        }
        if let Some(secs) = number("DOCSYNC_AUTO_VERSION_INTERVAL_SECS") {
            self.auto_version_interval_secs = secs;
        }
        if let Some(ms) = number("DOCSYNC_RENUMBER_SETTLE_TIMEOUT_MS") {
            self.renumber_settle_timeout_ms = ms;
        }
    }
}

impl From<&Settings> for SyncTimings {
    fn from(settings: &Settings) -> Self {
        Self {
            save_debounce: Duration::from_millis(settings.save_debounce_ms),
            edit_grace: Duration::from_millis(settings.edit_grace_ms),
            pull_interval: Duration::from_secs(settings.pull_interval_secs.max(1)),
            auto_version_interval: Duration::from_secs(settings.auto_version_interval_secs.max(1)),
            renumber_settle_timeout: Duration::from_millis(settings.renumber_settle_timeout_ms),
        }
    }
}

/// Timing section of the config file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, prefer::FromValue)]
pub struct SyncConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub save_debounce_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edit_grace_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull_interval_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_version_interval_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub renumber_settle_timeout_ms: Option<u64>,
}

impl SyncConfig {
    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }
}

/// Configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize, prefer::FromValue)]
pub struct Config {
    /// API base URL.
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "api_url")]
    pub api_base_url: Option<String>,
    /// API bearer token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,
    /// Request timeout in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout: Option<u64>,
    /// Sync timing overrides.
    #[serde(default, skip_serializing_if = "SyncConfig::is_default")]
    #[prefer(default)]
    pub sync: SyncConfig,
    /// Path to the config file this was loaded from (not serialized).
    #[serde(skip)]
    #[prefer(skip)]
    pub source_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration using prefer crate for discovery.
    pub async fn load() -> Self {
        match prefer::load("docsync").await {
            Ok(pref_config) => match pref_config.source_path() {
                Some(path) => Self::load_from_path(path).await.unwrap_or_else(|e| {
                    tracing::warn!("{}", e);
                    Self::default()
                }),
                None => Self::default(),
            },
            // No config file found
            Err(_) => Self::default(),
        }
    }

    /// Load configuration from a specific file path.
    /// Supports JSON, TOML and YAML based on file extension.
    pub async fn load_from_path(path: &Path) -> Result<Self, String> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| format!("Failed to read config file: {}", e))?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

        let mut config: Config = match ext {
            "toml" => toml::from_str(&contents)
                .map_err(|e| format!("Failed to parse TOML config: {}", e))?,
            "yaml" | "yml" => serde_yaml::from_str(&contents)
                .map_err(|e| format!("Failed to parse YAML config: {}", e))?,
            _ => serde_json::from_str(&contents)
                .map_err(|e| format!("Failed to parse JSON config: {}", e))?,
        };

        config.source_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Apply configuration to settings.
    pub fn apply_to_settings(&self, settings: &mut Settings) {
        if let Some(ref url) = self.api_base_url {
            settings.api_base_url = url.clone();
        }
        if let Some(ref token) = self.api_token {
            settings.api_token = Some(token.clone());
        }
        if let Some(timeout) = self.request_timeout {
            settings.request_timeout = timeout;
        }

        let sync = &self.sync;
        if let Some(ms) = sync.save_debounce_ms {
            settings.save_debounce_ms = ms;
        }
        if let Some(ms) = sync.edit_grace_ms {
            settings.edit_grace_ms = ms;
        }
        if let Some(secs) = sync.pull_interval_secs {
            settings.pull_interval_secs = secs;
        }
        if let Some(secs) = sync.auto_version_interval_secs {
            settings.auto_version_interval_secs = secs;
        }
        if let Some(ms) = sync.renumber_settle_timeout_ms {
            settings.renumber_settle_timeout_ms = ms;
        }
    }
}

/// Options for loading settings.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Explicit config file (overrides auto-discovery). `~` is expanded.
    pub config_path: Option<PathBuf>,
}

/// Load settings with explicit options.
/// Returns (Settings, Config) tuple.
pub async fn load_settings_with_options(options: LoadOptions) -> (Settings, Config) {
    let config = match options.config_path {
        Some(ref path) => {
            let expanded = shellexpand::tilde(&path.to_string_lossy()).into_owned();
            Config::load_from_path(Path::new(&expanded))
                .await
                .unwrap_or_else(|e| {
                    tracing::warn!("{}", e);
                    Config::default()
                })
        }
        None => Config::load().await,
    };

    let mut settings = Settings::default();
    config.apply_to_settings(&mut settings);

    // Environment variables take precedence over the config file
    settings.apply_env_overrides(|name| std::env::var(name).ok());

    (settings, config)
}
