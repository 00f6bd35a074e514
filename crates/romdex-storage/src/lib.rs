//! Filesystem plumbing for romdex
//!
//! Resolves the placeholder-laden paths found in EmulationStation-style
//! catalogs, takes local snapshots of per-system game lists, and watches the
//! catalog document for external edits.
//!
//! # Layout
//!
//! romdex reads from two places it does not own and writes to one it does:
//! - ROM root (`%ROMPATH%`): one directory per system, each with an optional
//!   `gamelist.xml`
//! - Frontend home: the systems catalog, alternate game lists and custom
//!   collections
//! - Data directory: the SQLite store and the snapshot cache

mod resolver;
mod snapshot;
mod watcher;

pub use resolver::{
    HOME_PLACEHOLDER, PathResolver, ROMPATH_PLACEHOLDER, follow_real, is_accessible_directory,
    is_accessible_file, normalize_lexically, short_hash, slugify, to_stable_id,
};
pub use snapshot::{SNAPSHOT_FILE_NAME, Snapshot, SnapshotStore};
pub use watcher::{CatalogWatcher, Debouncer, ErrorThrottle, WatchOptions};

use std::path::PathBuf;
use thiserror::Error;

/// Name of the per-system game-list document
pub const GAMELIST_FILE_NAME: &str = "gamelist.xml";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Source document not found: {0}")]
    SourceMissing(PathBuf),

    #[error("Source document is empty: {0}")]
    SourceEmpty(PathBuf),

    #[error("Watch failed: {0}")]
    WatchFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Resolved romdex locations
#[derive(Debug, Clone)]
pub struct Paths {
    /// Root of the ROM tree (what `%ROMPATH%` expands to)
    pub roms: PathBuf,
    /// Systems catalog document
    pub catalog: PathBuf,
    /// Alternate game-list tree (`<dir>/<system>/gamelist.xml`)
    pub gamelists: Option<PathBuf>,
    /// Custom collection files
    pub collections: PathBuf,
    /// SQLite database file
    pub database: PathBuf,
    /// Snapshot cache directory
    pub snapshots: PathBuf,
}

impl Paths {
    /// Game-list locations for a system, in lookup order
    pub fn gamelist_candidates(&self, system_name: &str, rom_dir: &std::path::Path) -> Vec<PathBuf> {
        let mut candidates = vec![rom_dir.join(GAMELIST_FILE_NAME)];
        if let Some(dir) = &self.gamelists {
            candidates.push(dir.join(system_name).join(GAMELIST_FILE_NAME));
        }
        candidates
    }

    /// The first existing game-list document for a system
    pub fn find_gamelist(&self, system_name: &str, rom_dir: &std::path::Path) -> Option<PathBuf> {
        self.gamelist_candidates(system_name, rom_dir)
            .into_iter()
            .find(|p| is_accessible_file(p))
    }
}
