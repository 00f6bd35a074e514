//! Game library cache for romdex
//!
//! Indexes an EmulationStation-style library (a systems catalog plus one
//! `gamelist.xml` per system) into SQLite and an in-memory index, and
//! serves browse, search and collection reads from memory.

mod cache;
mod catalog;
mod collections;
mod database;
mod gamelist;
mod index;
mod metadata;
mod model;
mod progress;
mod scanner;
mod xml;

pub use cache::{CacheSettings, CacheStats, LibraryCache, ScanStatus};
pub use catalog::{RawSystemEntry, normalize_extensions, parse_systems, parse_systems_from_reader};
pub use collections::{CustomCollection, list_custom_collections, read_collection_file};
pub use database::{GameDatabase, ScanKind, ScanRecord, StoredCollection};
pub use gamelist::{GameList, ParseOptions, parse_entries, parse_entries_from_reader};
pub use index::{GamePage, IndexCounts, MemoryIndex, SortKey, SortOrder};
pub use metadata::{
    RawGameEntry, clean_game_name, game_id, normalize_rating, parse_es_date, parse_players,
};
pub use model::{CoreDef, EmulatorDef, Game, MediaRefs, PlayerRange, System};
pub use progress::{ProgressSender, ScanEvent, ScanStage};
pub use scanner::{FullScanSummary, SystemScanSummary};

use romdex_storage::StorageError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Scan in progress")]
    ScanInProgress,

    #[error("System not found: {0}")]
    SystemNotFound(String),

    #[error("Game not found: {0}")]
    GameNotFound(String),

    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Collection types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Collection {
    /// All games
    All,
    /// Favorites
    Favorites,
    /// Recently played
    RecentlyPlayed,
    /// By system
    System(String),
    /// Custom collection by name
    Custom(String),
}
