//! Cross-Platform Path Utilities
//!
//! Resolves the client's data directory (~/.code-historian/).

use std::path::{Path, PathBuf};

use crate::utils::error::{HistorianError, HistorianResult};

/// Get the user's home directory
pub fn home_dir() -> HistorianResult<PathBuf> {
    dirs::home_dir()
        .ok_or_else(|| HistorianError::configuration("Could not determine home directory"))
}

/// Get the Code Historian directory (~/.code-historian/)
pub fn historian_dir() -> HistorianResult<PathBuf> {
    Ok(home_dir()?.join(".code-historian"))
}

/// Get the settings file path (~/.code-historian/settings.json)
pub fn settings_path() -> HistorianResult<PathBuf> {
    Ok(historian_dir()?.join("settings.json"))
}

/// Ensure a directory exists, creating it if necessary
pub fn ensure_dir(path: &Path) -> HistorianResult<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}
