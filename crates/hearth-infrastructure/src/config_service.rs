//! Configuration service implementation.
//!
//! Loads the root configuration from `config.toml` (~/.config/hearth/config.toml
//! by default).

use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};

use hearth_core::config::RootConfig;
use hearth_core::error::Result;

use crate::paths::HearthPaths;

/// Configuration service that loads and caches the root configuration.
///
/// This implementation reads the configuration from config.toml
/// and caches it to avoid repeated file I/O operations.
#[derive(Debug, Clone)]
pub struct ConfigService {
    path: Option<PathBuf>,
    /// Cached configuration loaded from file.
    /// Uses RwLock for thread-safe lazy loading.
    config: Arc<RwLock<Option<RootConfig>>>,
}

impl Default for ConfigService {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigService {
    /// Creates a ConfigService reading the default config file.
    ///
    /// The configuration is loaded lazily on first access to avoid blocking
    /// during initialization.
    pub fn new() -> Self {
        Self {
            path: HearthPaths::default().config_file().ok(),
            config: Arc::new(RwLock::new(None)),
        }
    }

    /// Creates a ConfigService reading from an explicit path.
    pub fn with_path(path: PathBuf) -> Self {
        Self {
            path: Some(path),
            config: Arc::new(RwLock::new(None)),
        }
    }

    /// Gets the root configuration, loading from file if not cached.
    ///
    /// Unreadable or malformed files fall back to defaults.
    pub fn get_config(&self) -> RootConfig {
        // Check if already cached
        {
            let read_lock = self.config.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(ref cached) = *read_lock {
                return cached.clone();
            }
        }

        let loaded = match self.try_load() {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("[ConfigService] Using default config: {}", e);
                RootConfig::default()
            }
        };

        // Cache it
        {
            let mut write_lock = self.config.write().unwrap_or_else(PoisonError::into_inner);
            *write_lock = Some(loaded.clone());
        }

        loaded
    }

    /// Invalidates the cache, forcing a reload on next access.
    pub fn invalidate_cache(&self) {
        let mut write_lock = self.config.write().unwrap_or_else(PoisonError::into_inner);
        *write_lock = None;
    }

    /// Reads and parses the config file without touching the cache.
    ///
    /// A missing file is not an error; it yields the defaults.
    pub fn try_load(&self) -> Result<RootConfig> {
        let Some(path) = &self.path else {
            return Ok(RootConfig::default());
        };

        if !path.exists() {
            tracing::debug!("[ConfigService] No config at {:?}, using defaults", path);
            return Ok(RootConfig::default());
        }

        let content = fs::read_to_string(path)?;
        if content.trim().is_empty() {
            return Ok(RootConfig::default());
        }

        Ok(toml::from_str(&content)?)
    }

    pub fn config_path(&self) -> Option<&PathBuf> {
        self.path.as_ref()
    }
}
