//! Library, cache and watcher settings

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Where the game library lives
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryConfig {
    /// ROM root, substituted for `%ROMPATH%` in the catalog
    #[serde(default = "default_root")]
    pub root: String,

    /// Systems catalog document
    #[serde(default = "default_catalog")]
    pub catalog: String,

    /// Alternate game-list tree (`<dir>/<system>/gamelist.xml`)
    #[serde(default = "default_gamelists_dir")]
    pub gamelists_dir: Option<String>,

    /// Directory holding `custom-*.cfg` collection files
    #[serde(default = "default_collections_dir")]
    pub collections_dir: String,

    /// Index games flagged hidden in their game list
    #[serde(default)]
    pub show_hidden: bool,
}

fn default_root() -> String {
    "~/ROMs".to_string()
}

fn default_catalog() -> String {
    "~/.emulationstation/es_systems.xml".to_string()
}

fn default_gamelists_dir() -> Option<String> {
    Some("~/.emulationstation/gamelists".to_string())
}

fn default_collections_dir() -> String {
    "~/.emulationstation/collections".to_string()
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            catalog: default_catalog(),
            gamelists_dir: default_gamelists_dir(),
            collections_dir: default_collections_dir(),
            show_hidden: false,
        }
    }
}

/// Local cache storage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Data directory (platform data dir when unset)
    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    /// SQLite file name inside the data directory
    #[serde(default = "default_database")]
    pub database: String,

    /// Snapshot directory name inside the data directory
    #[serde(default = "default_snapshot_dir")]
    pub snapshot_dir: String,

    /// Serve the last stored library while the first scan runs
    #[serde(default = "default_true")]
    pub warm_start: bool,
}

fn default_database() -> String {
    "library.db".to_string()
}

fn default_snapshot_dir() -> String {
    "gamelists".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            database: default_database(),
            snapshot_dir: default_snapshot_dir(),
            warm_start: true,
        }
    }
}

impl CacheConfig {
    /// Resolved data directory
    pub fn data_dir(&self) -> PathBuf {
        if let Some(dir) = &self.data_dir {
            return dir.clone();
        }
        directories::ProjectDirs::from("", "", "romdex")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from(".romdex"))
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir().join(&self.database)
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.data_dir().join(&self.snapshot_dir)
    }
}

/// Catalog watcher settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatcherConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Quiet period before a burst of catalog edits triggers a rescan
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Watcher errors logged per window
    #[serde(default = "default_max_errors")]
    pub max_errors_per_window: u32,

    #[serde(default = "default_error_window")]
    pub error_window_secs: u64,
}

fn default_debounce_ms() -> u64 {
    2000
}

fn default_max_errors() -> u32 {
    5
}

fn default_error_window() -> u64 {
    60
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            debounce_ms: default_debounce_ms(),
            max_errors_per_window: default_max_errors(),
            error_window_secs: default_error_window(),
        }
    }
}

/// Optional features
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureConfig {
    /// Custom collections from `custom-*.cfg`
    #[serde(default = "default_true")]
    pub collections: bool,

    /// Window for the recently-played collection
    #[serde(default = "default_recent_days")]
    pub recent_days: u32,
}

fn default_recent_days() -> u32 {
    30
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            collections: true,
            recent_days: default_recent_days(),
        }
    }
}
