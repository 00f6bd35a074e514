//! Game database using SQLite
//!
//! The durable tier: systems, games, collections and the scan log, plus an
//! FTS5 index over the searchable game text. Batched writes run inside one
//! transaction each. List reads join on `systems` so games whose system row
//! is gone are never returned.

use crate::LibraryError;
use crate::model::{Game, MediaRefs, PlayerRange, System};
use chrono::NaiveDateTime;
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};

/// What a scan covered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanKind {
    Full,
    System,
}

impl ScanKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanKind::Full => "full",
            ScanKind::System => "system",
        }
    }

    fn parse(value: &str) -> Self {
        if value == "system" {
            ScanKind::System
        } else {
            ScanKind::Full
        }
    }
}

/// A scan log row
#[derive(Debug, Clone, PartialEq)]
pub struct ScanRecord {
    pub kind: ScanKind,
    /// System id for targeted rescans
    pub target: Option<String>,
    pub success: bool,
    pub duration_ms: u64,
    pub games_found: usize,
    pub errors: Vec<String>,
    pub started_at: NaiveDateTime,
}

/// A stored collection snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredCollection {
    pub id: String,
    pub name: String,
    pub kind: String,
    pub source: Option<String>,
    pub game_ids: Vec<String>,
}

/// Game database manager
pub struct GameDatabase {
    conn: Connection,
}

impl GameDatabase {
    /// Open or create a database
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LibraryError> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;

        let db = Self { conn };
        db.init_schema()?;

        Ok(db)
    }

    /// Create an in-memory database (for testing)
    pub fn in_memory() -> Result<Self, LibraryError> {
        let conn = Connection::open_in_memory()?;

        let db = Self { conn };
        db.init_schema()?;

        Ok(db)
    }

    /// Initialize database schema
    fn init_schema(&self) -> Result<(), LibraryError> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS systems (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                full_name TEXT NOT NULL,
                manufacturer TEXT,
                release_year INTEGER,
                hardware TEXT,
                rom_path TEXT NOT NULL,
                resolved_path TEXT NOT NULL,
                extensions TEXT NOT NULL DEFAULT '[]',
                command TEXT,
                emulators TEXT NOT NULL DEFAULT '[]',
                platforms TEXT NOT NULL DEFAULT '[]',
                theme TEXT,
                accessible INTEGER NOT NULL DEFAULT 0,
                game_count INTEGER NOT NULL DEFAULT 0,
                last_scanned TEXT,
                updated_at TEXT DEFAULT CURRENT_TIMESTAMP
            );

            CREATE TABLE IF NOT EXISTS games (
                id TEXT PRIMARY KEY,
                system_id TEXT NOT NULL,
                path TEXT NOT NULL,
                resolved_path TEXT NOT NULL,
                name TEXT NOT NULL,
                description TEXT,
                developer TEXT,
                publisher TEXT,
                release_date TEXT,
                release_year INTEGER,
                genre TEXT,
                players_min INTEGER NOT NULL DEFAULT 1,
                players_max INTEGER NOT NULL DEFAULT 1,
                rating REAL NOT NULL DEFAULT 0,
                play_count INTEGER NOT NULL DEFAULT 0,
                last_played TEXT,
                play_time INTEGER NOT NULL DEFAULT 0,
                hidden INTEGER NOT NULL DEFAULT 0,
                favorite INTEGER NOT NULL DEFAULT 0,
                kid_game INTEGER NOT NULL DEFAULT 0,
                language TEXT,
                hash TEXT,
                image TEXT,
                thumbnail TEXT,
                video TEXT,
                marquee TEXT,
                fanart TEXT,
                manual TEXT,
                file_exists INTEGER NOT NULL DEFAULT 0,
                updated_at TEXT DEFAULT CURRENT_TIMESTAMP
            );

            CREATE VIRTUAL TABLE IF NOT EXISTS games_fts USING fts5(
                game_id UNINDEXED,
                name,
                description,
                developer,
                publisher,
                genre,
                tokenize = 'unicode61 remove_diacritics 2'
            );

            CREATE TABLE IF NOT EXISTS collections (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                kind TEXT NOT NULL,
                source TEXT,
                updated_at TEXT DEFAULT CURRENT_TIMESTAMP
            );

            CREATE TABLE IF NOT EXISTS collection_games (
                collection_id TEXT NOT NULL,
                game_id TEXT NOT NULL,
                position INTEGER NOT NULL,
                PRIMARY KEY (collection_id, game_id)
            );

            CREATE TABLE IF NOT EXISTS scan_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                kind TEXT NOT NULL,
                target TEXT,
                success INTEGER NOT NULL,
                duration_ms INTEGER NOT NULL,
                games_found INTEGER NOT NULL,
                errors TEXT NOT NULL DEFAULT '[]',
                started_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_games_system ON games(system_id);
            CREATE INDEX IF NOT EXISTS idx_games_name ON games(name);
            CREATE INDEX IF NOT EXISTS idx_games_favorite ON games(favorite);
            CREATE INDEX IF NOT EXISTS idx_games_last_played ON games(last_played);
            CREATE INDEX IF NOT EXISTS idx_games_resolved_path ON games(resolved_path);
        "#,
        )?;

        Ok(())
    }

    // ---------------------------------------------------------------------
    // Systems
    // ---------------------------------------------------------------------

    /// Insert or fully replace a system
    pub fn upsert_system(&self, system: &System) -> Result<(), LibraryError> {
        insert_system(&self.conn, system)
    }

    /// Insert or replace many systems in one transaction
    pub fn upsert_systems(&mut self, systems: &[System]) -> Result<(), LibraryError> {
        let tx = self.conn.transaction()?;
        for system in systems {
            insert_system(&tx, system)?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Get a system by id
    pub fn get_system(&self, id: &str) -> Result<Option<System>, LibraryError> {
        let system = self
            .conn
            .query_row(
                "SELECT * FROM systems WHERE id = ?1",
                params![id],
                Self::row_to_system,
            )
            .optional()?;

        Ok(system)
    }

    /// Get all systems
    pub fn get_systems(&self) -> Result<Vec<System>, LibraryError> {
        let mut stmt = self
            .conn
            .prepare("SELECT * FROM systems ORDER BY full_name COLLATE NOCASE")?;

        let systems = stmt
            .query_map([], Self::row_to_system)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(systems)
    }

    // ---------------------------------------------------------------------
    // Games
    // ---------------------------------------------------------------------

    /// Insert or fully replace a game
    pub fn upsert_game(&self, game: &Game) -> Result<(), LibraryError> {
        let tx = self.conn.unchecked_transaction()?;
        insert_game(&tx, game)?;
        tx.commit()?;
        Ok(())
    }

    /// Insert or replace a batch of games atomically
    pub fn upsert_games(&mut self, games: &[Game]) -> Result<(), LibraryError> {
        let tx = self.conn.transaction()?;
        for game in games {
            insert_game(&tx, game)?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Replace a system and its whole game set in one transaction.
    ///
    /// Prior games of the system are deleted first, so ids that vanished
    /// from the source never survive a rescan.
    pub fn replace_system_games(
        &mut self,
        system: &System,
        games: &[Game],
    ) -> Result<(), LibraryError> {
        let tx = self.conn.transaction()?;
        insert_system(&tx, system)?;
        delete_system_games(&tx, &system.id)?;
        for game in games {
            insert_game(&tx, game)?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Get a game by ID
    pub fn get_game(&self, id: &str) -> Result<Option<Game>, LibraryError> {
        let game = self
            .conn
            .query_row("SELECT * FROM games WHERE id = ?1", params![id], |row| {
                Self::row_to_game(row)
            })
            .optional()?;

        Ok(game)
    }

    /// Get a game by its resolved ROM path
    pub fn get_game_by_path(&self, path: &Path) -> Result<Option<Game>, LibraryError> {
        let game = self
            .conn
            .query_row(
                r#"SELECT g.* FROM games g
                   JOIN systems s ON s.id = g.system_id
                   WHERE g.resolved_path = ?1"#,
                params![path.to_string_lossy()],
                Self::row_to_game,
            )
            .optional()?;

        Ok(game)
    }

    /// Get all games, optionally including hidden ones
    pub fn get_all_games(&self, include_hidden: bool) -> Result<Vec<Game>, LibraryError> {
        let mut stmt = self.conn.prepare(
            r#"SELECT g.* FROM games g
               JOIN systems s ON s.id = g.system_id
               WHERE (?1 OR g.hidden = 0)
               ORDER BY g.name COLLATE NOCASE"#,
        )?;

        let games = stmt
            .query_map(params![include_hidden], Self::row_to_game)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(games)
    }

    /// Get games by system
    pub fn get_games_by_system(&self, system_id: &str) -> Result<Vec<Game>, LibraryError> {
        let mut stmt = self.conn.prepare(
            r#"SELECT g.* FROM games g
               JOIN systems s ON s.id = g.system_id
               WHERE g.system_id = ?1 AND g.hidden = 0
               ORDER BY g.name COLLATE NOCASE"#,
        )?;

        let games = stmt
            .query_map(params![system_id], Self::row_to_game)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(games)
    }

    /// Get favorite games
    pub fn get_favorites(&self) -> Result<Vec<Game>, LibraryError> {
        let mut stmt = self.conn.prepare(
            r#"SELECT g.* FROM games g
               JOIN systems s ON s.id = g.system_id
               WHERE g.favorite = 1 AND g.hidden = 0
               ORDER BY g.name COLLATE NOCASE"#,
        )?;

        let games = stmt
            .query_map([], Self::row_to_game)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(games)
    }

    /// Get recently played games
    pub fn get_recently_played(&self, limit: usize) -> Result<Vec<Game>, LibraryError> {
        let mut stmt = self.conn.prepare(
            r#"SELECT g.* FROM games g
               JOIN systems s ON s.id = g.system_id
               WHERE g.hidden = 0 AND g.last_played IS NOT NULL
               ORDER BY g.last_played DESC
               LIMIT ?1"#,
        )?;

        let games = stmt
            .query_map(params![limit as i64], Self::row_to_game)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(games)
    }

    /// Full-text search with prefix matching on every query term
    pub fn search_games(&self, query: &str, limit: usize) -> Result<Vec<Game>, LibraryError> {
        let Some(expr) = fts_query(query) else {
            return Ok(Vec::new());
        };

        let mut stmt = self.conn.prepare(
            r#"SELECT g.* FROM games_fts
               JOIN games g ON g.id = games_fts.game_id
               JOIN systems s ON s.id = g.system_id
               WHERE games_fts MATCH ?1 AND g.hidden = 0
               ORDER BY bm25(games_fts), g.name COLLATE NOCASE
               LIMIT ?2"#,
        )?;

        let games = stmt
            .query_map(params![expr, limit as i64], Self::row_to_game)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(games)
    }

    /// Set game as favorite. Returns false if no such game.
    pub fn set_favorite(&self, id: &str, favorite: bool) -> Result<bool, LibraryError> {
        let changed = self.conn.execute(
            "UPDATE games SET favorite = ?1, updated_at = CURRENT_TIMESTAMP WHERE id = ?2",
            params![favorite, id],
        )?;
        Ok(changed > 0)
    }

    /// Set game as hidden. Returns false if no such game.
    pub fn set_hidden(&self, id: &str, hidden: bool) -> Result<bool, LibraryError> {
        let changed = self.conn.execute(
            "UPDATE games SET hidden = ?1, updated_at = CURRENT_TIMESTAMP WHERE id = ?2",
            params![hidden, id],
        )?;
        Ok(changed > 0)
    }

    /// Delete every game of a system
    pub fn delete_by_system(&mut self, system_id: &str) -> Result<usize, LibraryError> {
        let tx = self.conn.transaction()?;
        let removed = delete_system_games(&tx, system_id)?;
        tx.commit()?;
        Ok(removed)
    }

    /// Delete all systems and games
    pub fn delete_all(&mut self) -> Result<(), LibraryError> {
        let tx = self.conn.transaction()?;
        tx.execute_batch(
            r#"
            DELETE FROM games_fts;
            DELETE FROM games;
            DELETE FROM systems;
            "#,
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Get total game count
    pub fn game_count(&self) -> Result<i64, LibraryError> {
        let count: i64 = self.conn.query_row(
            r#"SELECT COUNT(*) FROM games g
               JOIN systems s ON s.id = g.system_id
               WHERE g.hidden = 0"#,
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Get game count by system
    pub fn game_count_by_system(&self, system_id: &str) -> Result<i64, LibraryError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM games WHERE system_id = ?1 AND hidden = 0",
            params![system_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    // ---------------------------------------------------------------------
    // Collections
    // ---------------------------------------------------------------------

    /// Replace a collection and its membership in one transaction
    pub fn replace_collection(&mut self, collection: &StoredCollection) -> Result<(), LibraryError> {
        let tx = self.conn.transaction()?;
        tx.execute(
            r#"INSERT OR REPLACE INTO collections (id, name, kind, source, updated_at)
               VALUES (?1, ?2, ?3, ?4, CURRENT_TIMESTAMP)"#,
            params![collection.id, collection.name, collection.kind, collection.source],
        )?;
        tx.execute(
            "DELETE FROM collection_games WHERE collection_id = ?1",
            params![collection.id],
        )?;
        {
            let mut stmt = tx.prepare(
                r#"INSERT OR IGNORE INTO collection_games (collection_id, game_id, position)
                   VALUES (?1, ?2, ?3)"#,
            )?;
            for (position, game_id) in collection.game_ids.iter().enumerate() {
                stmt.execute(params![collection.id, game_id, position as i64])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Get a stored collection with its members in order
    pub fn get_collection(&self, id: &str) -> Result<Option<StoredCollection>, LibraryError> {
        let header = self
            .conn
            .query_row(
                "SELECT id, name, kind, source FROM collections WHERE id = ?1",
                params![id],
                |row| {
                    Ok(StoredCollection {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        kind: row.get(2)?,
                        source: row.get(3)?,
                        game_ids: Vec::new(),
                    })
                },
            )
            .optional()?;

        let Some(mut collection) = header else {
            return Ok(None);
        };

        let mut stmt = self.conn.prepare(
            "SELECT game_id FROM collection_games WHERE collection_id = ?1 ORDER BY position",
        )?;
        collection.game_ids = stmt
            .query_map(params![id], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;

        Ok(Some(collection))
    }

    // ---------------------------------------------------------------------
    // Scan log
    // ---------------------------------------------------------------------

    /// Append a scan record
    pub fn record_scan(&self, record: &ScanRecord) -> Result<i64, LibraryError> {
        self.conn.execute(
            r#"INSERT INTO scan_log
               (kind, target, success, duration_ms, games_found, errors, started_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"#,
            params![
                record.kind.as_str(),
                record.target,
                record.success,
                record.duration_ms as i64,
                record.games_found as i64,
                serde_json::to_string(&record.errors)?,
                record.started_at,
            ],
        )?;

        Ok(self.conn.last_insert_rowid())
    }

    /// Newest scan records first
    pub fn recent_scans(&self, limit: usize) -> Result<Vec<ScanRecord>, LibraryError> {
        let mut stmt = self.conn.prepare(
            r#"SELECT kind, target, success, duration_ms, games_found, errors, started_at
               FROM scan_log ORDER BY id DESC LIMIT ?1"#,
        )?;

        let records = stmt
            .query_map(params![limit as i64], |row| {
                let kind: String = row.get("kind")?;
                Ok(ScanRecord {
                    kind: ScanKind::parse(&kind),
                    target: row.get("target")?,
                    success: row.get("success")?,
                    duration_ms: to_unsigned(row.get("duration_ms")?),
                    games_found: to_unsigned(row.get("games_found")?) as usize,
                    errors: json_column(row, "errors")?,
                    started_at: row.get("started_at")?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(records)
    }

    // ---------------------------------------------------------------------
    // Row mapping
    // ---------------------------------------------------------------------

    /// Convert a row to a System
    fn row_to_system(row: &Row) -> rusqlite::Result<System> {
        Ok(System {
            id: row.get("id")?,
            name: row.get("name")?,
            full_name: row.get("full_name")?,
            manufacturer: row.get("manufacturer")?,
            release_year: row.get("release_year")?,
            hardware: row.get("hardware")?,
            rom_path: path_column(row, "rom_path")?,
            resolved_path: path_column(row, "resolved_path")?,
            extensions: json_column(row, "extensions")?,
            command: row.get("command")?,
            emulators: json_column(row, "emulators")?,
            platforms: json_column(row, "platforms")?,
            theme: row.get("theme")?,
            accessible: row.get("accessible")?,
            game_count: to_unsigned(row.get("game_count")?) as usize,
            last_scanned: row.get("last_scanned")?,
        })
    }

    /// Convert a row to a Game
    fn row_to_game(row: &Row) -> rusqlite::Result<Game> {
        Ok(Game {
            id: row.get("id")?,
            system_id: row.get("system_id")?,
            path: row.get("path")?,
            resolved_path: path_column(row, "resolved_path")?,
            name: row.get("name")?,
            description: row.get("description")?,
            developer: row.get("developer")?,
            publisher: row.get("publisher")?,
            release_date: row.get("release_date")?,
            genre: row.get("genre")?,
            players: PlayerRange {
                min: row.get("players_min")?,
                max: row.get("players_max")?,
            },
            rating: row.get("rating")?,
            play_count: row.get("play_count")?,
            last_played: row.get("last_played")?,
            play_time: to_unsigned(row.get("play_time")?),
            hidden: row.get("hidden")?,
            favorite: row.get("favorite")?,
            kid_game: row.get("kid_game")?,
            language: row.get("language")?,
            hash: row.get("hash")?,
            media: MediaRefs {
                image: optional_path_column(row, "image")?,
                thumbnail: optional_path_column(row, "thumbnail")?,
                video: optional_path_column(row, "video")?,
                marquee: optional_path_column(row, "marquee")?,
                fanart: optional_path_column(row, "fanart")?,
                manual: optional_path_column(row, "manual")?,
            },
            file_exists: row.get("file_exists")?,
        })
    }
}

fn insert_system(conn: &Connection, system: &System) -> Result<(), LibraryError> {
    conn.execute(
        r#"INSERT OR REPLACE INTO systems
           (id, name, full_name, manufacturer, release_year, hardware, rom_path,
            resolved_path, extensions, command, emulators, platforms, theme,
            accessible, game_count, last_scanned, updated_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
                   CURRENT_TIMESTAMP)"#,
        params![
            system.id,
            system.name,
            system.full_name,
            system.manufacturer,
            system.release_year,
            system.hardware,
            system.rom_path.to_string_lossy(),
            system.resolved_path.to_string_lossy(),
            to_json(&system.extensions)?,
            system.command,
            to_json(&system.emulators)?,
            to_json(&system.platforms)?,
            system.theme,
            system.accessible,
            system.game_count as i64,
            system.last_scanned,
        ],
    )?;
    Ok(())
}

fn insert_game(conn: &Connection, game: &Game) -> Result<(), LibraryError> {
    let path_text = |p: &Option<PathBuf>| p.as_ref().map(|p| p.to_string_lossy().to_string());

    conn.execute(
        r#"INSERT OR REPLACE INTO games
           (id, system_id, path, resolved_path, name, description, developer, publisher,
            release_date, release_year, genre, players_min, players_max, rating, play_count,
            last_played, play_time, hidden, favorite, kid_game, language, hash, image,
            thumbnail, video, marquee, fanart, manual, file_exists, updated_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
                   ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27, ?28, ?29,
                   CURRENT_TIMESTAMP)"#,
        params![
            game.id,
            game.system_id,
            game.path,
            game.resolved_path.to_string_lossy(),
            game.name,
            game.description,
            game.developer,
            game.publisher,
            game.release_date,
            game.release_year(),
            game.genre,
            game.players.min,
            game.players.max,
            game.rating,
            game.play_count,
            game.last_played,
            game.play_time as i64,
            game.hidden,
            game.favorite,
            game.kid_game,
            game.language,
            game.hash,
            path_text(&game.media.image),
            path_text(&game.media.thumbnail),
            path_text(&game.media.video),
            path_text(&game.media.marquee),
            path_text(&game.media.fanart),
            path_text(&game.media.manual),
            game.file_exists,
        ],
    )?;

    conn.execute("DELETE FROM games_fts WHERE game_id = ?1", params![game.id])?;
    conn.execute(
        r#"INSERT INTO games_fts (game_id, name, description, developer, publisher, genre)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6)"#,
        params![
            game.id,
            game.name,
            game.description,
            game.developer,
            game.publisher,
            game.genre,
        ],
    )?;

    Ok(())
}

fn delete_system_games(conn: &Connection, system_id: &str) -> Result<usize, LibraryError> {
    conn.execute(
        "DELETE FROM games_fts WHERE game_id IN (SELECT id FROM games WHERE system_id = ?1)",
        params![system_id],
    )?;
    let removed = conn.execute("DELETE FROM games WHERE system_id = ?1", params![system_id])?;
    Ok(removed)
}

/// Prefix-match every alphanumeric run of the query, all terms required
fn fts_query(query: &str) -> Option<String> {
    let terms: Vec<String> = query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| format!("\"{}\"*", t))
        .collect();

    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" "))
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<String, LibraryError> {
    Ok(serde_json::to_string(value)?)
}

fn json_column<T: DeserializeOwned>(row: &Row, name: &str) -> rusqlite::Result<T> {
    let text: String = row.get(name)?;
    serde_json::from_str(&text).map_err(|e| {
        let idx = row.as_ref().column_index(name).unwrap_or(0);
        rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
    })
}

fn path_column(row: &Row, name: &str) -> rusqlite::Result<PathBuf> {
    let text: String = row.get(name)?;
    Ok(PathBuf::from(text))
}

fn optional_path_column(row: &Row, name: &str) -> rusqlite::Result<Option<PathBuf>> {
    let text: Option<String> = row.get(name)?;
    Ok(text.map(PathBuf::from))
}

fn to_unsigned(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CoreDef, EmulatorDef};
    use chrono::NaiveDate;

    fn system(id: &str) -> System {
        System {
            id: id.to_string(),
            name: id.to_string(),
            full_name: format!("{} full", id),
            manufacturer: Some("Nintendo".to_string()),
            release_year: Some(1989),
            hardware: Some("portable".to_string()),
            rom_path: PathBuf::from(format!("/roms/{}", id)),
            resolved_path: PathBuf::from(format!("/mnt/roms/{}", id)),
            extensions: vec![".gb".to_string(), ".zip".to_string()],
            command: None,
            emulators: vec![EmulatorDef {
                name: "libretro".to_string(),
                cores: vec![CoreDef {
                    name: "gambatte".to_string(),
                    default: true,
                }],
            }],
            platforms: vec!["gb".to_string()],
            theme: Some("gb".to_string()),
            accessible: true,
            game_count: 0,
            last_scanned: None,
        }
    }

    fn game(system_id: &str, name: &str) -> Game {
        Game {
            id: format!("{}-{}", system_id, name.to_lowercase().replace(' ', "-")),
            system_id: system_id.to_string(),
            path: format!("./{}.gb", name),
            resolved_path: PathBuf::from(format!("/roms/{}/{}.gb", system_id, name)),
            name: name.to_string(),
            description: None,
            developer: None,
            publisher: None,
            release_date: None,
            genre: None,
            players: PlayerRange::default(),
            rating: 0.0,
            play_count: 0,
            last_played: None,
            play_time: 0,
            hidden: false,
            favorite: false,
            kid_game: false,
            language: None,
            hash: None,
            media: MediaRefs::default(),
            file_exists: true,
        }
    }

    fn seeded() -> GameDatabase {
        let mut db = GameDatabase::in_memory().unwrap();
        db.upsert_systems(&[system("gb"), system("gba")]).unwrap();
        db
    }

    #[test]
    fn test_database_creation() {
        let db = GameDatabase::in_memory().unwrap();
        assert_eq!(db.game_count().unwrap(), 0);
        assert!(db.get_systems().unwrap().is_empty());
    }

    #[test]
    fn test_system_round_trip() {
        let db = seeded();
        let stored = db.get_system("gb").unwrap().unwrap();
        assert_eq!(stored, system("gb"));
    }

    #[test]
    fn test_game_round_trip() {
        let db = seeded();
        let mut g = game("gb", "Tetris");
        g.description = Some("Falling blocks".to_string());
        g.release_date = NaiveDate::from_ymd_opt(1989, 6, 14).and_then(|d| d.and_hms_opt(0, 0, 0));
        g.last_played = NaiveDate::from_ymd_opt(2024, 1, 2).and_then(|d| d.and_hms_opt(20, 30, 0));
        g.players = PlayerRange { min: 1, max: 2 };
        g.rating = 0.8;
        g.play_count = 7;
        g.play_time = 3600;
        g.favorite = true;
        g.kid_game = true;
        g.hash = Some("abcdef".to_string());
        g.media.image = Some(PathBuf::from("/roms/gb/media/tetris.png"));

        db.upsert_game(&g).unwrap();
        let stored = db.get_game(&g.id).unwrap().unwrap();
        assert_eq!(stored, g);
    }

    #[test]
    fn test_replace_system_games_removes_stale() {
        let mut db = seeded();
        let gb = system("gb");
        db.replace_system_games(&gb, &[game("gb", "Tetris"), game("gb", "Kirby")])
            .unwrap();
        db.upsert_games(&[game("gba", "Metroid")]).unwrap();

        db.replace_system_games(&gb, &[game("gb", "Kirby")]).unwrap();

        assert!(db.get_game("gb-tetris").unwrap().is_none());
        assert!(db.get_game("gb-kirby").unwrap().is_some());
        assert!(db.get_game("gba-metroid").unwrap().is_some());
        assert!(db.search_games("tetris", 10).unwrap().is_empty());
        assert_eq!(db.game_count_by_system("gb").unwrap(), 1);
    }

    #[test]
    fn test_batch_is_atomic() {
        let mut db = seeded();
        db.upsert_games(&[game("gb", "Tetris")]).unwrap();

        // every insert now fails after the games row is written
        db.conn.execute_batch("DROP TABLE games_fts").unwrap();
        let result = db.upsert_games(&[game("gb", "Kirby"), game("gb", "Mole Mania")]);
        assert!(result.is_err());

        assert!(db.get_game("gb-kirby").unwrap().is_none());
        assert!(db.get_game("gb-tetris").unwrap().is_some());
    }

    #[test]
    fn test_search_prefix_and_fields() {
        let mut db = seeded();
        let mut zelda = game("gb", "Zelda Links Awakening");
        zelda.developer = Some("Nintendo EAD".to_string());
        let mut metroid = game("gba", "Metroid Fusion");
        metroid.genre = Some("Action Adventure".to_string());
        db.upsert_games(&[zelda, metroid]).unwrap();

        let hits = db.search_games("zel", 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "Zelda Links Awakening");

        let hits = db.search_games("nintend", 10).unwrap();
        assert_eq!(hits.len(), 1);

        let hits = db.search_games("adven", 10).unwrap();
        assert_eq!(hits[0].system_id, "gba");

        assert!(db.search_games("   ", 10).unwrap().is_empty());
        assert!(db.search_games("\"*", 10).unwrap().is_empty());
    }

    #[test]
    fn test_orphans_filtered_from_lists() {
        let mut db = seeded();
        db.upsert_games(&[game("gb", "Tetris"), game("psx", "Orphan")]).unwrap();

        let all = db.get_all_games(false).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(db.game_count().unwrap(), 1);
        assert!(db.search_games("orphan", 10).unwrap().is_empty());
    }

    #[test]
    fn test_upsert_system_replaces() {
        let db = seeded();
        let mut gb = system("gb");
        gb.full_name = "Game Boy".to_string();
        gb.accessible = false;
        db.upsert_system(&gb).unwrap();

        let stored = db.get_system("gb").unwrap().unwrap();
        assert_eq!(stored.full_name, "Game Boy");
        assert!(!stored.accessible);
        assert_eq!(db.get_systems().unwrap().len(), 2);

        db.upsert_system(&system("psx")).unwrap();
        assert!(db.get_system("psx").unwrap().is_some());
    }

    #[test]
    fn test_get_game_by_path() {
        let mut db = seeded();
        db.upsert_games(&[game("gb", "Tetris"), game("psx", "Orphan")]).unwrap();

        let found = db
            .get_game_by_path(Path::new("/roms/gb/Tetris.gb"))
            .unwrap()
            .unwrap();
        assert_eq!(found.id, "gb-tetris");
        assert!(db.get_game_by_path(Path::new("/roms/gb/None.gb")).unwrap().is_none());
        // row exists but its system does not
        assert!(db.get_game_by_path(Path::new("/roms/psx/Orphan.gb")).unwrap().is_none());
    }

    #[test]
    fn test_get_games_by_system() {
        let mut db = seeded();
        let mut hidden = game("gb", "Alleyway");
        hidden.hidden = true;
        db.upsert_games(&[
            game("gb", "Tetris"),
            game("gb", "Kirby"),
            hidden,
            game("gba", "Metroid"),
            game("psx", "Orphan"),
        ])
        .unwrap();

        let names: Vec<String> = db
            .get_games_by_system("gb")
            .unwrap()
            .into_iter()
            .map(|g| g.name)
            .collect();
        assert_eq!(names, vec!["Kirby", "Tetris"]);
        assert_eq!(db.get_games_by_system("gba").unwrap().len(), 1);
        assert!(db.get_games_by_system("psx").unwrap().is_empty());
    }

    #[test]
    fn test_set_favorite_and_hidden() {
        let mut db = seeded();
        db.upsert_games(&[game("gb", "Tetris")]).unwrap();

        assert!(db.set_favorite("gb-tetris", true).unwrap());
        assert_eq!(db.get_favorites().unwrap().len(), 1);
        assert!(!db.set_favorite("missing", true).unwrap());

        assert!(db.set_hidden("gb-tetris", true).unwrap());
        assert!(db.get_favorites().unwrap().is_empty());
        assert_eq!(db.get_all_games(true).unwrap().len(), 1);
    }

    #[test]
    fn test_recently_played_order() {
        let mut db = seeded();
        let mut a = game("gb", "A");
        a.last_played = NaiveDate::from_ymd_opt(2024, 1, 1).and_then(|d| d.and_hms_opt(0, 0, 0));
        let mut b = game("gb", "B");
        b.last_played = NaiveDate::from_ymd_opt(2024, 3, 1).and_then(|d| d.and_hms_opt(0, 0, 0));
        db.upsert_games(&[a, b, game("gb", "C")]).unwrap();

        let recent = db.get_recently_played(10).unwrap();
        let names: Vec<_> = recent.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, vec!["B", "A"]);
    }

    #[test]
    fn test_delete_by_system_and_all() {
        let mut db = seeded();
        db.upsert_games(&[game("gb", "Tetris"), game("gba", "Metroid")]).unwrap();

        assert_eq!(db.delete_by_system("gb").unwrap(), 1);
        assert_eq!(db.game_count().unwrap(), 1);

        db.delete_all().unwrap();
        assert_eq!(db.game_count().unwrap(), 0);
        assert!(db.get_systems().unwrap().is_empty());
    }

    #[test]
    fn test_collections() {
        let mut db = seeded();
        let collection = StoredCollection {
            id: "custom-beat-em-ups".to_string(),
            name: "Beat em ups".to_string(),
            kind: "custom".to_string(),
            source: Some("/es/collections/custom-Beat em ups.cfg".to_string()),
            game_ids: vec!["gb-b".to_string(), "gb-a".to_string()],
        };
        db.replace_collection(&collection).unwrap();
        assert_eq!(db.get_collection(&collection.id).unwrap(), Some(collection.clone()));

        let shorter = StoredCollection {
            game_ids: vec!["gb-a".to_string()],
            ..collection.clone()
        };
        db.replace_collection(&shorter).unwrap();
        assert_eq!(
            db.get_collection(&collection.id).unwrap().unwrap().game_ids,
            vec!["gb-a".to_string()]
        );
        assert!(db.get_collection("nope").unwrap().is_none());
    }

    #[test]
    fn test_scan_log() {
        let db = seeded();
        let started_at = NaiveDate::from_ymd_opt(2024, 5, 1)
            .and_then(|d| d.and_hms_opt(12, 0, 0))
            .unwrap();

        let first = ScanRecord {
            kind: ScanKind::Full,
            target: None,
            success: true,
            duration_ms: 1200,
            games_found: 42,
            errors: vec![],
            started_at,
        };
        let second = ScanRecord {
            kind: ScanKind::System,
            target: Some("gb".to_string()),
            success: false,
            duration_ms: 5,
            games_found: 0,
            errors: vec!["disk I/O error".to_string()],
            started_at,
        };
        db.record_scan(&first).unwrap();
        db.record_scan(&second).unwrap();

        let scans = db.recent_scans(10).unwrap();
        assert_eq!(scans, vec![second, first]);
    }

    #[test]
    fn test_fts_query_builder() {
        assert_eq!(fts_query("mario kart"), Some("\"mario\"* \"kart\"*".to_string()));
        assert_eq!(fts_query("R&D"), Some("\"R\"* \"D\"*".to_string()));
        assert_eq!(fts_query(" -- "), None);
    }
}
