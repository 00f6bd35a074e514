//! Canonical system and game records

use chrono::{Datelike, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A core offered by an emulator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreDef {
    pub name: String,
    pub default: bool,
}

/// An emulator entry from the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmulatorDef {
    pub name: String,
    pub cores: Vec<CoreDef>,
}

impl EmulatorDef {
    /// The core marked default, else the first declared one
    pub fn default_core(&self) -> Option<&CoreDef> {
        self.cores
            .iter()
            .find(|c| c.default)
            .or_else(|| self.cores.first())
    }
}

/// A gaming platform as described by the catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct System {
    /// Slug of `name`, unique across the catalog
    pub id: String,
    pub name: String,
    pub full_name: String,
    pub manufacturer: Option<String>,
    pub release_year: Option<i32>,
    pub hardware: Option<String>,
    /// ROM directory after placeholder expansion
    pub rom_path: PathBuf,
    /// ROM directory with symlinks followed
    pub resolved_path: PathBuf,
    /// Lower-case, dot-prefixed, declaration order
    pub extensions: Vec<String>,
    pub command: Option<String>,
    pub emulators: Vec<EmulatorDef>,
    pub platforms: Vec<String>,
    pub theme: Option<String>,
    pub accessible: bool,
    pub game_count: usize,
    pub last_scanned: Option<NaiveDateTime>,
}

impl System {
    /// Record the outcome of a scan on this system
    pub fn mark_scanned(&mut self, game_count: usize, at: NaiveDateTime) {
        self.game_count = if self.accessible { game_count } else { 0 };
        self.last_scanned = Some(at);
    }
}

/// Minimum and maximum simultaneous players
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerRange {
    pub min: u32,
    pub max: u32,
}

impl Default for PlayerRange {
    fn default() -> Self {
        Self { min: 1, max: 1 }
    }
}

/// Media attached to a game, each already resolved
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRefs {
    pub image: Option<PathBuf>,
    pub thumbnail: Option<PathBuf>,
    pub video: Option<PathBuf>,
    pub marquee: Option<PathBuf>,
    pub fanart: Option<PathBuf>,
    pub manual: Option<PathBuf>,
}

impl MediaRefs {
    pub fn is_empty(&self) -> bool {
        self.image.is_none()
            && self.thumbnail.is_none()
            && self.video.is_none()
            && self.marquee.is_none()
            && self.fanart.is_none()
            && self.manual.is_none()
    }
}

/// A playable entry belonging to exactly one system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Game {
    /// `<system id>-<path hash>`, unique across the library
    pub id: String,
    pub system_id: String,
    /// Path as written in the game list
    pub path: String,
    pub resolved_path: PathBuf,
    pub name: String,
    pub description: Option<String>,
    pub developer: Option<String>,
    pub publisher: Option<String>,
    pub release_date: Option<NaiveDateTime>,
    pub genre: Option<String>,
    pub players: PlayerRange,
    /// Always within [0, 1]
    pub rating: f32,
    pub play_count: u32,
    pub last_played: Option<NaiveDateTime>,
    /// Seconds
    pub play_time: u64,
    pub hidden: bool,
    pub favorite: bool,
    pub kid_game: bool,
    pub language: Option<String>,
    pub hash: Option<String>,
    pub media: MediaRefs,
    pub file_exists: bool,
}

impl Game {
    pub fn release_year(&self) -> Option<i32> {
        self.release_date.map(|d| d.year())
    }
}
