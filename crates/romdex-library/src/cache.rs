//! The library cache service
//!
//! `LibraryCache` owns both tiers: the SQLite store behind a mutex and the
//! memory index behind a read/write lock. Blocking work (parsing, SQLite)
//! runs on the tokio blocking pool. Scans live in `scanner.rs`.

use crate::database::{GameDatabase, ScanRecord};
use crate::index::{GamePage, MemoryIndex, SortKey, SortOrder};
use crate::model::{Game, System};
use crate::{Collection, LibraryError};
use chrono::NaiveDateTime;
use romdex_config::RomdexConfig;
use romdex_storage::{PathResolver, Paths, SnapshotStore, normalize_lexically};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Everything the cache needs to know about its environment
#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub paths: Paths,
    /// Keep games flagged hidden in their game list
    pub show_hidden: bool,
    /// Window for the recently-played collection
    pub recent_days: u32,
    pub collections_enabled: bool,
}

impl CacheSettings {
    /// Settings with defaults for everything but the locations
    pub fn new(paths: Paths) -> Self {
        Self {
            paths,
            show_hidden: false,
            recent_days: 30,
            collections_enabled: true,
        }
    }

    /// Resolve configured locations into absolute paths
    pub fn from_config(config: &RomdexConfig) -> Self {
        let resolver = PathResolver::new(&config.library.root);
        let expand = |path: &str| normalize_lexically(&resolver.expand(path));
        let paths = Paths {
            roms: resolver.roms_root().to_path_buf(),
            catalog: expand(&config.library.catalog),
            gamelists: config.library.gamelists_dir.as_deref().map(expand),
            collections: expand(&config.library.collections_dir),
            database: config.cache.database_path(),
            snapshots: config.cache.snapshot_path(),
        };

        Self {
            paths,
            show_hidden: config.library.show_hidden,
            recent_days: config.features.recent_days,
            collections_enabled: config.features.collections,
        }
    }
}

/// Scan state as seen by callers
#[derive(Debug, Clone, PartialEq)]
pub struct ScanStatus {
    pub in_progress: bool,
    pub last_scan: Option<ScanRecord>,
}

/// Library-wide counters
#[derive(Debug, Clone, PartialEq)]
pub struct CacheStats {
    pub system_count: usize,
    pub accessible_system_count: usize,
    pub total_games: usize,
    pub favorites_count: usize,
    pub last_scan: Option<NaiveDateTime>,
    pub scan_in_progress: bool,
}

/// Held for the duration of a scan; releases the scan flag on drop
#[derive(Debug)]
pub(crate) struct ScanGuard {
    flag: Arc<AtomicBool>,
}

impl Drop for ScanGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Two-tier cache over an EmulationStation-style library
pub struct LibraryCache {
    pub(crate) settings: CacheSettings,
    pub(crate) resolver: PathResolver,
    pub(crate) snapshots: SnapshotStore,
    pub(crate) db: Arc<Mutex<GameDatabase>>,
    pub(crate) index: RwLock<MemoryIndex>,
    scanning: Arc<AtomicBool>,
    pub(crate) last_scan: Mutex<Option<ScanRecord>>,
}

impl LibraryCache {
    /// Build a cache over an already opened store
    pub fn new(settings: CacheSettings, db: GameDatabase) -> Self {
        let resolver = PathResolver::new(&settings.paths.roms);
        Self::with_resolver(settings, resolver, db)
    }

    /// Build a cache with an explicit resolver
    pub fn with_resolver(settings: CacheSettings, resolver: PathResolver, db: GameDatabase) -> Self {
        let snapshots = SnapshotStore::new(&settings.paths.snapshots);
        let index = MemoryIndex::new(settings.show_hidden);

        Self {
            settings,
            resolver,
            snapshots,
            db: Arc::new(Mutex::new(db)),
            index: RwLock::new(index),
            scanning: Arc::new(AtomicBool::new(false)),
            last_scan: Mutex::new(None),
        }
    }

    /// Open the store at the configured database path
    pub fn open(settings: CacheSettings) -> Result<Self, LibraryError> {
        let db = GameDatabase::open(&settings.paths.database)?;
        tracing::info!("Opened library store at {}", settings.paths.database.display());
        Ok(Self::new(settings, db))
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    // ---------------------------------------------------------------------
    // Plumbing
    // ---------------------------------------------------------------------

    /// Take the scan flag or fail fast
    pub(crate) fn begin_scan(&self) -> Result<ScanGuard, LibraryError> {
        self.scanning
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| LibraryError::ScanInProgress)?;

        Ok(ScanGuard {
            flag: Arc::clone(&self.scanning),
        })
    }

    pub fn is_scanning(&self) -> bool {
        self.scanning.load(Ordering::Acquire)
    }

    pub(crate) fn read_index(&self) -> RwLockReadGuard<'_, MemoryIndex> {
        self.index.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn write_index(&self) -> RwLockWriteGuard<'_, MemoryIndex> {
        self.index.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` against the store on the blocking pool
    pub(crate) async fn with_db<T, F>(&self, f: F) -> Result<T, LibraryError>
    where
        F: FnOnce(&mut GameDatabase) -> Result<T, LibraryError> + Send + 'static,
        T: Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || {
            let mut db = db
                .lock()
                .map_err(|_| LibraryError::Database("store lock poisoned".to_string()))?;
            f(&mut db)
        })
        .await?
    }

    // ---------------------------------------------------------------------
    // Reads (memory tier)
    // ---------------------------------------------------------------------

    pub fn get_systems(&self, accessible_only: bool) -> Vec<System> {
        self.read_index().get_systems(accessible_only)
    }

    pub fn get_system(&self, id: &str) -> Result<System, LibraryError> {
        self.read_index()
            .get_system(id)
            .cloned()
            .ok_or_else(|| LibraryError::SystemNotFound(id.to_string()))
    }

    pub fn get_games(
        &self,
        system_id: Option<&str>,
        page: usize,
        page_size: usize,
        sort_by: SortKey,
        order: SortOrder,
    ) -> Result<GamePage, LibraryError> {
        self.read_index()
            .get_games(system_id, page, page_size, sort_by, order)
    }

    pub fn get_game(&self, id: &str) -> Result<Arc<Game>, LibraryError> {
        self.read_index()
            .get_game(id)
            .ok_or_else(|| LibraryError::GameNotFound(id.to_string()))
    }

    /// Game at a resolved ROM path, for launch collaborators
    pub fn game_by_path(&self, path: &Path) -> Option<Arc<Game>> {
        self.read_index().game_by_path(path)
    }

    pub fn search(&self, query: &str, limit: usize, system_filter: Option<&str>) -> Vec<Arc<Game>> {
        self.read_index().search(query, limit, system_filter)
    }

    pub fn get_favorites(&self) -> Vec<Arc<Game>> {
        self.read_index().get_favorites()
    }

    pub fn get_recently_played(&self, days: u32) -> Vec<Arc<Game>> {
        self.read_index().get_recently_played(days)
    }

    pub fn get_random(&self, system_id: Option<&str>, count: usize) -> Vec<Arc<Game>> {
        self.read_index().get_random(system_id, count)
    }

    /// Prefix full-text search over the durable tier
    pub async fn search_store(&self, query: &str, limit: usize) -> Result<Vec<Game>, LibraryError> {
        let query = query.to_string();
        self.with_db(move |db| db.search_games(&query, limit)).await
    }

    /// Games of a dynamic or custom collection
    pub async fn get_collection(&self, collection: &Collection) -> Result<Vec<Arc<Game>>, LibraryError> {
        match collection {
            Collection::All => {
                let index = self.read_index();
                let total = index.counts().total_games;
                Ok(index
                    .get_games(None, 1, total, SortKey::Name, SortOrder::Asc)?
                    .games)
            }
            Collection::Favorites => Ok(self.get_favorites()),
            Collection::RecentlyPlayed => Ok(self.get_recently_played(self.settings.recent_days)),
            Collection::System(id) => {
                let index = self.read_index();
                let total = index.counts().total_games;
                Ok(index
                    .get_games(Some(id), 1, total, SortKey::Name, SortOrder::Asc)?
                    .games)
            }
            Collection::Custom(name) => Ok(self.load_custom_collection(name).await?.games),
        }
    }

    // ---------------------------------------------------------------------
    // Mutations outside scans
    // ---------------------------------------------------------------------

    /// Set the favorite flag in the store and the indexed copy
    pub async fn set_favorite(&self, id: &str, favorite: bool) -> Result<Arc<Game>, LibraryError> {
        let game_id = id.to_string();
        let found = self
            .with_db(move |db| db.set_favorite(&game_id, favorite))
            .await?;
        if !found {
            return Err(LibraryError::GameNotFound(id.to_string()));
        }

        tracing::debug!("Favorite {} = {}", id, favorite);
        self.write_index()
            .update_game(id, |g| g.favorite = favorite)
            .ok_or_else(|| LibraryError::GameNotFound(id.to_string()))
    }

    /// Flip the favorite flag
    pub async fn toggle_favorite(&self, id: &str) -> Result<Arc<Game>, LibraryError> {
        let current = self.get_game(id)?;
        self.set_favorite(id, !current.favorite).await
    }

    /// Set the hidden flag in the store and the indexed copy
    pub async fn set_hidden(&self, id: &str, hidden: bool) -> Result<Arc<Game>, LibraryError> {
        let game_id = id.to_string();
        let found = self
            .with_db(move |db| db.set_hidden(&game_id, hidden))
            .await?;
        if !found {
            return Err(LibraryError::GameNotFound(id.to_string()));
        }

        tracing::debug!("Hidden {} = {}", id, hidden);
        self.write_index()
            .update_game(id, |g| g.hidden = hidden)
            .ok_or_else(|| LibraryError::GameNotFound(id.to_string()))
    }

    // ---------------------------------------------------------------------
    // Status
    // ---------------------------------------------------------------------

    pub fn scan_status(&self) -> ScanStatus {
        ScanStatus {
            in_progress: self.is_scanning(),
            last_scan: self.last_scan(),
        }
    }

    pub fn cache_stats(&self) -> CacheStats {
        let counts = self.read_index().counts();
        CacheStats {
            system_count: counts.system_count,
            accessible_system_count: counts.accessible_system_count,
            total_games: counts.total_games,
            favorites_count: counts.favorites_count,
            last_scan: self.last_scan().map(|r| r.started_at),
            scan_in_progress: self.is_scanning(),
        }
    }

    fn last_scan(&self) -> Option<ScanRecord> {
        self.last_scan
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Newest scan log rows
    pub async fn recent_scans(&self, limit: usize) -> Result<Vec<ScanRecord>, LibraryError> {
        self.with_db(move |db| db.recent_scans(limit)).await
    }

    // ---------------------------------------------------------------------
    // Warm start
    // ---------------------------------------------------------------------

    /// Rebuild the memory tier from the durable tier.
    ///
    /// Source documents are not read. Returns the number of games restored.
    pub async fn restore_from_store(&self) -> Result<usize, LibraryError> {
        let _guard = self.begin_scan()?;

        // hidden rows stay reachable by id; the index filters listings
        let (systems, games) = self
            .with_db(|db| Ok((db.get_systems()?, db.get_all_games(true)?)))
            .await?;

        let mut grouped: HashMap<String, Vec<Game>> = HashMap::new();
        for game in games {
            grouped.entry(game.system_id.clone()).or_default().push(game);
        }

        let restored = {
            let mut index = self.write_index();
            index.clear();
            let mut restored = 0;
            for system in systems {
                let games = grouped.remove(&system.id).unwrap_or_default();
                restored += games.len();
                index.replace_system(system, games);
            }
            restored
        };

        tracing::info!("Restored {} games from the store", restored);
        Ok(restored)
    }
}
