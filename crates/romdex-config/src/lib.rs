//! Configuration for romdex
//!
//! A single TOML file describes where the library lives, where the cache is
//! kept, and how the catalog watcher behaves. Every field has a default so an
//! empty file (or no file at all) is a valid configuration.

mod library_config;

pub use library_config::{CacheConfig, FeatureConfig, LibraryConfig, WatcherConfig};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

/// Environment variable naming an explicit config file
pub const CONFIG_ENV: &str = "ROMDEX_CONFIG";

/// Config file name inside the user config directory
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Main romdex configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RomdexConfig {
    #[serde(default)]
    pub library: LibraryConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub watcher: WatcherConfig,

    #[serde(default)]
    pub features: FeatureConfig,
}

impl RomdexConfig {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from default locations
    pub fn load_default() -> Result<Self, ConfigError> {
        // An explicit path must exist
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return Self::load(Path::new(&path));
        }

        if let Some(path) = Self::user_config_path() {
            if path.exists() {
                return Self::load(&path);
            }
        }

        tracing::warn!("No configuration file found, using defaults");
        Ok(Self::default())
    }

    /// Per-user config file location
    pub fn user_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "romdex")
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, contents)?;
        tracing::info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Reject values the cache cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.library.root.trim().is_empty() {
            return Err(ConfigError::Invalid("library.root is empty".to_string()));
        }
        if self.library.catalog.trim().is_empty() {
            return Err(ConfigError::Invalid("library.catalog is empty".to_string()));
        }
        if self.cache.database.trim().is_empty() {
            return Err(ConfigError::Invalid("cache.database is empty".to_string()));
        }
        if self.watcher.debounce_ms == 0 {
            return Err(ConfigError::Invalid(
                "watcher.debounce_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
