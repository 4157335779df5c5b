//! Unified path management for hearth files.
//!
//! Config, logs and model data resolve through the `dirs` crate so every
//! platform gets its conventional location.

use std::path::PathBuf;

use thiserror::Error;

const APP_DIR_NAME: &str = "hearth";

/// Errors that can occur during path resolution.
#[derive(Debug, Error)]
pub enum PathError {
    /// Home directory could not be determined.
    #[error("Cannot find home directory")]
    HomeDirNotFound,
}

/// Unified path management for hearth.
///
/// # Directory Structure
///
/// ```text
/// ~/.config/hearth/                     # Config directory
/// ├── config.toml                       # Application configuration
/// └── logs/                             # Diagnostic logs
///     ├── hearth-diagnostics.log        # Current launch
///     └── hearth-diagnostics.previous.log
///
/// ~/.local/share/hearth/                # Data directory (model weights)
/// ```
///
/// A `base` override replaces both roots, which keeps tests inside a temp dir.
#[derive(Debug, Clone, Default)]
pub struct HearthPaths {
    base: Option<PathBuf>,
}

impl HearthPaths {
    pub fn new(base: Option<PathBuf>) -> Self {
        Self { base }
    }

    /// Returns the hearth configuration directory (e.g. `~/.config/hearth/`).
    pub fn config_dir(&self) -> Result<PathBuf, PathError> {
        match &self.base {
            Some(base) => Ok(base.join("config")),
            None => dirs::config_dir()
                .map(|dir| dir.join(APP_DIR_NAME))
                .ok_or(PathError::HomeDirNotFound),
        }
    }

    /// Returns the hearth data directory (e.g. `~/.local/share/hearth/`).
    ///
    /// Used for larger files such as downloaded weights.
    pub fn data_dir(&self) -> Result<PathBuf, PathError> {
        match &self.base {
            Some(base) => Ok(base.join("data")),
            None => dirs::data_dir()
                .map(|dir| dir.join(APP_DIR_NAME))
                .ok_or(PathError::HomeDirNotFound),
        }
    }

    /// Returns the path to the main configuration file.
    pub fn config_file(&self) -> Result<PathBuf, PathError> {
        Ok(self.config_dir()?.join("config.toml"))
    }

    /// Returns the path to the logs directory.
    pub fn logs_dir(&self) -> Result<PathBuf, PathError> {
        Ok(self.config_dir()?.join("logs"))
    }

    /// Returns the directory a given model's weights are stored under.
    pub fn model_dir(&self, model_id: &str) -> Result<PathBuf, PathError> {
        Ok(self.data_dir()?.join("models").join(model_id))
    }
}
