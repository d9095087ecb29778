//! JSON Configuration Management
//!
//! Handles reading and writing the client settings file, and exposes the
//! read-only [`SettingsProvider`] view consumed by the transport and the
//! session manager.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use tracing::{debug, info};

use crate::models::settings::{HistorianSettings, SettingsUpdate};
use crate::utils::error::{HistorianError, HistorianResult};
use crate::utils::paths::{ensure_dir, settings_path};

/// Environment variable that supplies the API key
pub const API_KEY_ENV: &str = "CODE_HISTORIAN_API_KEY";

/// Read-only source of settings snapshots.
///
/// Each call returns the settings as they are now, so edits made through a
/// [`ConfigService`] are picked up by the next request.
pub trait SettingsProvider: Send + Sync {
    fn settings(&self) -> HistorianSettings;
}

impl SettingsProvider for HistorianSettings {
    fn settings(&self) -> HistorianSettings {
        self.clone()
    }
}

impl SettingsProvider for RwLock<ConfigService> {
    fn settings(&self) -> HistorianSettings {
        self.read()
            .unwrap_or_else(PoisonError::into_inner)
            .get_config_clone()
    }
}

/// Configuration service for managing client settings
#[derive(Debug)]
pub struct ConfigService {
    config_path: PathBuf,
    config: HistorianSettings,
}

impl ConfigService {
    /// Create a config service backed by ~/.code-historian/settings.json
    pub fn new() -> HistorianResult<Self> {
        Self::open(settings_path()?)
    }

    /// Create a config service backed by `config_path`, loading existing
    /// settings or writing defaults.
    pub fn open(config_path: PathBuf) -> HistorianResult<Self> {
        if let Some(parent) = config_path.parent() {
            ensure_dir(parent)?;
        }

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            info!("No settings at {}, writing defaults", config_path.display());
            let default_config = HistorianSettings::default();
            Self::save_to_file(&config_path, &default_config)?;
            default_config
        };
        apply_env_override(&mut config, std::env::var(API_KEY_ENV).ok());

        Ok(Self {
            config_path,
            config,
        })
    }

    /// Load configuration from a file
    fn load_from_file(path: &Path) -> HistorianResult<HistorianSettings> {
        let content = fs::read_to_string(path)?;
        let config: HistorianSettings = serde_json::from_str(&content)?;
        config.validate().map_err(HistorianError::validation)?;
        debug!("Loaded settings from {}", path.display());
        Ok(config)
    }

    /// Save configuration to a file with pretty formatting
    fn save_to_file(path: &Path, config: &HistorianSettings) -> HistorianResult<()> {
        config.validate().map_err(HistorianError::validation)?;
        let content = serde_json::to_string_pretty(config)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Get the current configuration
    pub fn get_config(&self) -> &HistorianSettings {
        &self.config
    }

    /// Get a clone of the current configuration
    pub fn get_config_clone(&self) -> HistorianSettings {
        self.config.clone()
    }

    /// Update the configuration with a partial update.
    ///
    /// The update is validated before anything is written; a rejected update
    /// leaves both memory and disk untouched.
    pub fn update_config(&mut self, update: SettingsUpdate) -> HistorianResult<HistorianSettings> {
        let mut next = self.config.clone();
        next.apply_update(update);
        Self::save_to_file(&self.config_path, &next)?;
        self.config = next;
        Ok(self.config.clone())
    }

    /// Save the current configuration to disk
    pub fn save(&self) -> HistorianResult<()> {
        Self::save_to_file(&self.config_path, &self.config)
    }

    /// Reload configuration from disk, keeping the in-memory API key
    pub fn reload(&mut self) -> HistorianResult<()> {
        let api_key = self.config.api_key.take();
        match Self::load_from_file(&self.config_path) {
            Ok(mut config) => {
                config.api_key = api_key;
                self.config = config;
                Ok(())
            }
            Err(e) => {
                self.config.api_key = api_key;
                Err(e)
            }
        }
    }

    /// Reset configuration to defaults, keeping the in-memory API key
    pub fn reset(&mut self) -> HistorianResult<()> {
        let api_key = self.config.api_key.take();
        self.config = HistorianSettings {
            api_key,
            ..HistorianSettings::default()
        };
        self.save()
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }
}

/// Apply an API key from the environment, ignoring blank values.
fn apply_env_override(config: &mut HistorianSettings, env_key: Option<String>) {
    if let Some(key) = env_key.filter(|k| !k.trim().is_empty()) {
        debug!("Using API key from {}", API_KEY_ENV);
        config.api_key = Some(key);
    }
}
