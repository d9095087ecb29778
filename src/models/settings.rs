//! Settings Models
//!
//! Client configuration stored in settings.json.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Client configuration.
///
/// The API key is never read from or written to the settings file; it is
/// supplied by the environment or by the host's credential store.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistorianSettings {
    /// Base URL of the analysis server (http or https)
    #[serde(default = "default_server_url")]
    pub server_url: String,
    #[serde(skip)]
    pub api_key: Option<String>,
    /// Maximum number of commits to walk per file
    #[serde(default = "default_max_history_depth")]
    pub max_history_depth: u32,
    /// Path fragments the server should skip
    #[serde(default = "default_excluded_paths")]
    pub excluded_paths: Vec<String>,
    #[serde(default)]
    pub notifications: NotificationSettings,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
    /// Upper bound on the start request, in seconds
    #[serde(default = "default_start_timeout_secs")]
    pub start_timeout_secs: u64,
}

fn default_server_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_max_history_depth() -> u32 {
    100
}

fn default_excluded_paths() -> Vec<String> {
    vec!["node_modules".to_string()]
}

fn default_start_timeout_secs() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

impl Default for HistorianSettings {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            api_key: None,
            max_history_depth: default_max_history_depth(),
            excluded_paths: default_excluded_paths(),
            notifications: NotificationSettings::default(),
            reconnect: ReconnectConfig::default(),
            start_timeout_secs: default_start_timeout_secs(),
        }
    }
}

impl fmt::Debug for HistorianSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HistorianSettings")
            .field("server_url", &self.server_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("max_history_depth", &self.max_history_depth)
            .field("excluded_paths", &self.excluded_paths)
            .field("notifications", &self.notifications)
            .field("reconnect", &self.reconnect)
            .field("start_timeout_secs", &self.start_timeout_secs)
            .finish()
    }
}

/// User-facing notification switches
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationSettings {
    /// Master switch for prompts and status notices
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Whether transient status notices are shown
    #[serde(default = "default_true")]
    pub show_in_status_bar: bool,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            show_in_status_bar: true,
        }
    }
}

/// Reconnect behavior after the progress stream drops unexpectedly
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconnectConfig {
    /// Maximum number of reconnect attempts before giving up (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Base delay in milliseconds for exponential backoff (default: 1000)
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Maximum delay in milliseconds (default: 30000)
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    30000
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl ReconnectConfig {
    /// Calculate the delay before reconnect attempt `attempt` (1-based).
    ///
    /// Formula: `min(2^(attempt - 1) * base_delay_ms, max_delay_ms)`
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let delay = self
            .base_delay_ms
            .saturating_mul(2u64.saturating_pow(exponent));
        Duration::from_millis(delay.min(self.max_delay_ms))
    }
}

/// Settings update request (partial update)
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SettingsUpdate {
    pub server_url: Option<String>,
    pub api_key: Option<String>,
    pub max_history_depth: Option<u32>,
    pub excluded_paths: Option<Vec<String>>,
    pub notifications_enabled: Option<bool>,
    pub show_in_status_bar: Option<bool>,
    pub reconnect: Option<ReconnectConfig>,
    pub start_timeout_secs: Option<u64>,
}

impl HistorianSettings {
    /// The configured server URL, or `None` when unset.
    pub fn server_url(&self) -> Option<&str> {
        let url = self.server_url.trim();
        (!url.is_empty()).then_some(url)
    }

    /// The configured API key, or `None` when unset.
    pub fn api_key(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }

    pub fn start_timeout(&self) -> Duration {
        Duration::from_secs(self.start_timeout_secs)
    }

    /// Apply a partial update to the configuration
    pub fn apply_update(&mut self, update: SettingsUpdate) {
        if let Some(server_url) = update.server_url {
            self.server_url = server_url;
        }
        if let Some(api_key) = update.api_key {
            self.api_key = Some(api_key);
        }
        if let Some(depth) = update.max_history_depth {
            self.max_history_depth = depth;
        }
        if let Some(paths) = update.excluded_paths {
            self.excluded_paths = paths;
        }
        if let Some(enabled) = update.notifications_enabled {
            self.notifications.enabled = enabled;
        }
        if let Some(show) = update.show_in_status_bar {
            self.notifications.show_in_status_bar = show;
        }
        if let Some(reconnect) = update.reconnect {
            self.reconnect = reconnect;
        }
        if let Some(timeout) = update.start_timeout_secs {
            self.start_timeout_secs = timeout;
        }
    }

    /// Validate the configuration
    ///
    /// An empty server URL is accepted here: it surfaces as a configuration
    /// error when a request is attempted.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(raw) = self.server_url() {
            let parsed = url::Url::parse(raw)
                .map_err(|e| format!("Invalid server URL {}: {}", raw, e))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(format!(
                    "Invalid server URL scheme: {}. Must be 'http' or 'https'",
                    parsed.scheme()
                ));
            }
        }

        if self.max_history_depth == 0 {
            return Err("maxHistoryDepth must be at least 1".to_string());
        }

        if self.reconnect.max_attempts > 20 {
            return Err("reconnect.maxAttempts cannot exceed 20".to_string());
        }

        if self.reconnect.base_delay_ms > self.reconnect.max_delay_ms {
            return Err("reconnect.baseDelayMs cannot exceed reconnect.maxDelayMs".to_string());
        }

        if self.start_timeout_secs == 0 {
            return Err("startTimeoutSecs must be at least 1 second".to_string());
        }

        Ok(())
    }
}
