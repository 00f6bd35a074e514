//! Scan orchestration
//!
//! A full scan runs catalog → snapshots → per-system parse → publish. Only
//! one scan runs at a time; a second request fails with `ScanInProgress`
//! instead of queueing. Each system is published to the store in one
//! transaction and to the memory index in one swap, store first.

use crate::cache::{LibraryCache, ScanGuard};
use crate::catalog::parse_systems;
use crate::database::{ScanKind, ScanRecord};
use crate::gamelist::{ParseOptions, parse_entries};
use crate::model::{Game, System};
use crate::progress::{ProgressSender, ScanEvent, ScanStage, emit, system_percent};
use crate::LibraryError;
use chrono::{Local, NaiveDateTime};
use romdex_storage::{PathResolver, Paths, SnapshotStore, StorageError};
use std::path::PathBuf;
use std::sync::{Arc, PoisonError};
use std::time::{Duration, Instant};
use tokio::task::{JoinHandle, spawn_blocking};

/// Outcome of a full scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FullScanSummary {
    pub success: bool,
    pub duration: Duration,
    pub system_count: usize,
    pub accessible_system_count: usize,
    pub game_count: usize,
}

/// Outcome of a single-system rescan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemScanSummary {
    pub success: bool,
    pub duration: Duration,
    pub game_count: usize,
}

impl LibraryCache {
    /// Rebuild the whole library from the catalog.
    ///
    /// Fails with `ScanInProgress` if another scan holds the flag.
    pub async fn full_scan(
        &self,
        progress: Option<ProgressSender>,
    ) -> Result<FullScanSummary, LibraryError> {
        let guard = self.begin_scan()?;
        self.run_full_scan(guard, progress).await
    }

    /// Start a full scan on the runtime.
    ///
    /// The scan flag is taken before returning, so a scan requested right
    /// after this call is rejected.
    pub fn spawn_full_scan(
        self: &Arc<Self>,
        progress: Option<ProgressSender>,
    ) -> Result<JoinHandle<Result<FullScanSummary, LibraryError>>, LibraryError> {
        let guard = self.begin_scan()?;
        let cache = Arc::clone(self);
        Ok(tokio::spawn(async move {
            cache.run_full_scan(guard, progress).await
        }))
    }

    async fn run_full_scan(
        &self,
        _guard: ScanGuard,
        progress: Option<ProgressSender>,
    ) -> Result<FullScanSummary, LibraryError> {
        let started = Instant::now();
        let started_at = Local::now().naive_local();
        tracing::info!("Starting full library scan");
        emit(progress.as_ref(), ScanEvent::progress(ScanStage::Started, 0));

        let outcome = self.full_scan_steps(progress.as_ref(), started_at).await;
        let duration = started.elapsed();

        let record = ScanRecord {
            kind: ScanKind::Full,
            target: None,
            success: outcome.is_ok(),
            duration_ms: duration.as_millis() as u64,
            games_found: outcome.as_ref().map(|s| s.game_count).unwrap_or(0),
            errors: outcome.as_ref().err().map(|e| vec![e.to_string()]).unwrap_or_default(),
            started_at,
        };
        self.finish_scan(record).await;

        match outcome {
            Ok(mut summary) => {
                summary.duration = duration;
                tracing::info!(
                    "Full scan complete: {} systems ({} accessible), {} games in {:?}",
                    summary.system_count,
                    summary.accessible_system_count,
                    summary.game_count,
                    duration
                );
                emit(progress.as_ref(), ScanEvent::progress(ScanStage::Done, 100));
                emit(progress.as_ref(), ScanEvent::Completed(summary.clone()));
                Ok(summary)
            }
            Err(e) => {
                tracing::error!("Full scan failed: {}", e);
                emit(progress.as_ref(), ScanEvent::failed(&e));
                Err(e)
            }
        }
    }

    async fn full_scan_steps(
        &self,
        progress: Option<&ProgressSender>,
        scanned_at: NaiveDateTime,
    ) -> Result<FullScanSummary, LibraryError> {
        // Parsing happens before anything is cleared so a missing catalog
        // leaves the previous index untouched.
        let systems = self.load_catalog().await?;
        emit(progress, ScanEvent::progress(ScanStage::CatalogParsed, 10));

        self.write_index().clear();
        let snapshots = self.snapshots.clone();
        spawn_blocking(move || snapshots.clear()).await??;
        self.with_db(|db| db.delete_all()).await?;

        let snapshot_paths = self.take_snapshots(&systems).await?;
        emit(progress, ScanEvent::progress(ScanStage::SnapshotsComplete, 20));

        let total = systems.len();
        let mut summary = FullScanSummary {
            success: true,
            duration: Duration::ZERO,
            system_count: total,
            accessible_system_count: 0,
            game_count: 0,
        };

        for (i, (system, snapshot)) in systems.into_iter().zip(snapshot_paths).enumerate() {
            let system_id = system.id.clone();
            if system.accessible {
                summary.accessible_system_count += 1;
            }

            let games = match snapshot {
                Some(path) => self.parse_snapshot(&system, path).await?,
                None => Vec::new(),
            };
            summary.game_count += self.publish_system(system, games, scanned_at).await?;

            emit(progress, ScanEvent::system_scanned(system_id, system_percent(i + 1, total)));
        }

        Ok(summary)
    }

    /// Rescan a single system by id.
    ///
    /// The catalog is re-read so path or extension edits are picked up.
    /// Previous games of the system disappear from both tiers in the same
    /// step that publishes the new ones.
    pub async fn scan_system(&self, id: &str) -> Result<SystemScanSummary, LibraryError> {
        let _guard = self.begin_scan()?;
        let started = Instant::now();
        let started_at = Local::now().naive_local();

        let outcome = self.scan_system_steps(id, started_at).await;
        let duration = started.elapsed();

        let record = ScanRecord {
            kind: ScanKind::System,
            target: Some(id.to_string()),
            success: outcome.is_ok(),
            duration_ms: duration.as_millis() as u64,
            games_found: outcome.as_ref().copied().unwrap_or(0),
            errors: outcome.as_ref().err().map(|e| vec![e.to_string()]).unwrap_or_default(),
            started_at,
        };
        self.finish_scan(record).await;

        let game_count = outcome?;
        tracing::info!("Rescanned {}: {} games in {:?}", id, game_count, duration);
        Ok(SystemScanSummary {
            success: true,
            duration,
            game_count,
        })
    }

    async fn scan_system_steps(&self, id: &str, scanned_at: NaiveDateTime) -> Result<usize, LibraryError> {
        let wanted = id.to_lowercase();
        let system = self
            .load_catalog()
            .await?
            .into_iter()
            .find(|s| s.id == id || s.id.to_lowercase() == wanted || s.name.to_lowercase() == wanted)
            .ok_or_else(|| LibraryError::SystemNotFound(id.to_string()))?;

        let snapshot = self
            .take_snapshots(std::slice::from_ref(&system))
            .await?
            .pop()
            .flatten();

        let games = match snapshot {
            Some(path) => self.parse_snapshot(&system, path).await?,
            None => Vec::new(),
        };

        self.publish_system(system, games, scanned_at).await
    }

    async fn load_catalog(&self) -> Result<Vec<System>, LibraryError> {
        let catalog = self.settings.paths.catalog.clone();
        let resolver = self.resolver.clone();
        spawn_blocking(move || parse_systems(&catalog, &resolver)).await?
    }

    /// Copy each accessible system's game list into the snapshot store.
    ///
    /// Returns one slot per system; `None` means the system has no games.
    async fn take_snapshots(&self, systems: &[System]) -> Result<Vec<Option<PathBuf>>, LibraryError> {
        let wanted: Vec<(String, String, PathBuf, bool)> = systems
            .iter()
            .map(|s| (s.id.clone(), s.name.clone(), s.resolved_path.clone(), s.accessible))
            .collect();
        let paths = self.settings.paths.clone();
        let store = self.snapshots.clone();

        let slots = spawn_blocking(move || snapshot_all(&paths, &store, wanted)).await?;
        Ok(slots)
    }

    /// Parse a snapshot. Parser failures cost the system its games, not
    /// the scan.
    async fn parse_snapshot(&self, system: &System, snapshot: PathBuf) -> Result<Vec<Game>, LibraryError> {
        let rom_dir = system.rom_path.clone();
        let system_id = system.id.clone();
        let resolver: PathResolver = self.resolver.clone();
        let options = ParseOptions {
            include_hidden: self.settings.show_hidden,
        };

        let parsed = spawn_blocking(move || {
            parse_entries(&snapshot, &rom_dir, &system_id, &resolver, options)
        })
        .await?;

        match parsed {
            Ok(list) => Ok(list.games),
            Err(e) => {
                tracing::warn!("Failed to parse game list for {}: {}", system.id, e);
                Ok(Vec::new())
            }
        }
    }

    /// Write a system and its games to the store, then swap them into the
    /// index. Store failures abort the scan.
    async fn publish_system(
        &self,
        mut system: System,
        games: Vec<Game>,
        scanned_at: NaiveDateTime,
    ) -> Result<usize, LibraryError> {
        let games = if system.accessible { games } else { Vec::new() };
        system.mark_scanned(games.len(), scanned_at);

        let (system, games) = self
            .with_db(move |db| {
                db.replace_system_games(&system, &games)?;
                Ok((system, games))
            })
            .await?;

        let count = games.len();
        tracing::debug!("Published {} with {} games", system.id, count);
        self.write_index().replace_system(system, games);
        Ok(count)
    }

    /// Append to the scan log and remember the record. Logging failures
    /// never mask the scan outcome.
    async fn finish_scan(&self, record: ScanRecord) {
        let stored = record.clone();
        if let Err(e) = self.with_db(move |db| db.record_scan(&stored)).await {
            tracing::warn!("Failed to record scan: {}", e);
        }
        *self.last_scan.lock().unwrap_or_else(PoisonError::into_inner) = Some(record);
    }
}

fn snapshot_all(
    paths: &Paths,
    store: &SnapshotStore,
    systems: Vec<(String, String, PathBuf, bool)>,
) -> Vec<Option<PathBuf>> {
    systems
        .into_iter()
        .map(|(id, name, rom_dir, accessible)| {
            if !accessible {
                if let Err(e) = store.remove(&id) {
                    tracing::debug!("Could not remove snapshot for {}: {}", id, e);
                }
                return None;
            }

            let Some(source) = paths.find_gamelist(&name, &rom_dir) else {
                tracing::info!("No game list for {}", id);
                if let Err(e) = store.remove(&id) {
                    tracing::debug!("Could not remove snapshot for {}: {}", id, e);
                }
                return None;
            };

            match store.take(&id, &source) {
                Ok(snapshot) => Some(snapshot.path),
                Err(StorageError::SourceEmpty(path)) => {
                    tracing::info!("Game list {} is empty", path.display());
                    None
                }
                Err(e) => {
                    tracing::warn!("Could not snapshot game list for {}: {}", id, e);
                    None
                }
            }
        })
        .collect()
}
