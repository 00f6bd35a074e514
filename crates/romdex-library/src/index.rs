//! In-memory projection of the library
//!
//! Hot-path reads never touch SQLite. Each system's games are swapped in as
//! one replacement, so readers see either the old set or the new one.

use crate::LibraryError;
use crate::model::{Game, System};
use chrono::{Duration, Local, NaiveDateTime};
use rand::seq::SliceRandom;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Sort keys for game listings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    /// Case-insensitive name
    #[default]
    Name,
    ReleaseYear,
    Rating,
    PlayCount,
    LastPlayed,
    PlayTime,
    Random,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        }
    }
}

/// One page of a game listing
#[derive(Debug, Clone)]
pub struct GamePage {
    pub games: Vec<Arc<Game>>,
    pub total: usize,
    /// 1-based
    pub page: usize,
    pub page_size: usize,
    pub total_pages: usize,
}

/// Counts over the indexed library
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexCounts {
    pub system_count: usize,
    pub accessible_system_count: usize,
    pub total_games: usize,
    pub favorites_count: usize,
}

/// Systems and games keyed for constant-time lookup
#[derive(Debug, Default)]
pub struct MemoryIndex {
    systems: HashMap<String, System>,
    games: HashMap<String, Arc<Game>>,
    /// Game ids per system, in game-list order
    by_system: HashMap<String, Vec<String>>,
    include_hidden: bool,
}

impl MemoryIndex {
    /// `include_hidden` keeps games flagged hidden visible in listings
    pub fn new(include_hidden: bool) -> Self {
        Self {
            include_hidden,
            ..Default::default()
        }
    }

    pub fn clear(&mut self) {
        self.systems.clear();
        self.games.clear();
        self.by_system.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.systems.is_empty()
    }

    /// Swap in a system and its complete game set.
    ///
    /// Games previously indexed under the system are dropped first.
    pub fn replace_system(&mut self, system: System, games: Vec<Game>) {
        if let Some(previous) = self.by_system.remove(&system.id) {
            for id in previous {
                self.games.remove(&id);
            }
        }

        let mut ids = Vec::with_capacity(games.len());
        for game in games {
            ids.push(game.id.clone());
            self.games.insert(game.id.clone(), Arc::new(game));
        }

        self.by_system.insert(system.id.clone(), ids);
        self.systems.insert(system.id.clone(), system);
    }

    /// Systems sorted by full name
    pub fn get_systems(&self, accessible_only: bool) -> Vec<System> {
        let mut systems: Vec<System> = self
            .systems
            .values()
            .filter(|s| !accessible_only || s.accessible)
            .cloned()
            .collect();
        systems.sort_by(|a, b| {
            a.full_name
                .to_lowercase()
                .cmp(&b.full_name.to_lowercase())
                .then_with(|| a.id.cmp(&b.id))
        });
        systems
    }

    /// Exact id first, then case-insensitive on id or name
    pub fn get_system(&self, id: &str) -> Option<&System> {
        if let Some(system) = self.systems.get(id) {
            return Some(system);
        }
        let wanted = id.to_lowercase();
        let mut matches: Vec<&System> = self
            .systems
            .values()
            .filter(|s| s.id.to_lowercase() == wanted || s.name.to_lowercase() == wanted)
            .collect();
        matches.sort_by(|a, b| a.id.cmp(&b.id));
        matches.into_iter().next()
    }

    pub fn get_game(&self, id: &str) -> Option<Arc<Game>> {
        self.games.get(id).cloned()
    }

    /// Game whose resolved path is `path`
    pub fn game_by_path(&self, path: &Path) -> Option<Arc<Game>> {
        self.games
            .values()
            .find(|g| g.resolved_path == path)
            .cloned()
    }

    /// Map resolved paths onto indexed games. Unmatched paths come back
    /// in the second list, both in input order.
    pub fn games_by_paths(&self, paths: &[PathBuf]) -> (Vec<Arc<Game>>, Vec<PathBuf>) {
        let lookup: HashMap<&Path, &Arc<Game>> = self
            .games
            .values()
            .map(|g| (g.resolved_path.as_path(), g))
            .collect();

        let mut found = Vec::new();
        let mut missing = Vec::new();
        for path in paths {
            match lookup.get(path.as_path()) {
                Some(game) => found.push(Arc::clone(game)),
                None => missing.push(path.clone()),
            }
        }
        (found, missing)
    }

    /// A sorted page of games, for one system or the whole library.
    ///
    /// `page` is 1-based; 0 is treated as 1. A page past the end is empty.
    pub fn get_games(
        &self,
        system_id: Option<&str>,
        page: usize,
        page_size: usize,
        sort_by: SortKey,
        order: SortOrder,
    ) -> Result<GamePage, LibraryError> {
        let mut games = match system_id {
            Some(id) => {
                let system = self
                    .get_system(id)
                    .ok_or_else(|| LibraryError::SystemNotFound(id.to_string()))?;
                self.system_games(&system.id)
            }
            None => self.visible_games().cloned().collect(),
        };

        sort_games(&mut games, sort_by, order);

        let page = page.max(1);
        let page_size = page_size.max(1);
        let total = games.len();
        let total_pages = total.div_ceil(page_size);
        let games = games
            .into_iter()
            .skip((page - 1).saturating_mul(page_size))
            .take(page_size)
            .collect();

        Ok(GamePage {
            games,
            total,
            page,
            page_size,
            total_pages,
        })
    }

    /// Case-insensitive substring search.
    ///
    /// Name matches rank above matches on description, developer, publisher
    /// or genre; among name matches exact beats prefix beats substring. Ties
    /// are ordered by name.
    pub fn search(&self, query: &str, limit: usize, system_filter: Option<&str>) -> Vec<Arc<Game>> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() || limit == 0 {
            return Vec::new();
        }
        let system_id = match system_filter {
            Some(filter) => match self.get_system(filter) {
                Some(system) => Some(system.id.as_str()),
                None => return Vec::new(),
            },
            None => None,
        };

        let mut hits: Vec<(u8, String, &Arc<Game>)> = self
            .visible_games()
            .filter(|g| system_id.is_none_or(|s| g.system_id == s))
            .filter_map(|g| {
                let name = g.name.to_lowercase();
                let rank = search_rank(g, &name, &needle)?;
                Some((rank, name, g))
            })
            .collect();

        hits.sort_by(|a, b| {
            a.0.cmp(&b.0)
                .then_with(|| a.1.cmp(&b.1))
                .then_with(|| a.2.id.cmp(&b.2.id))
        });

        hits.into_iter()
            .take(limit)
            .map(|(_, _, g)| Arc::clone(g))
            .collect()
    }

    /// Favorites sorted by name
    pub fn get_favorites(&self) -> Vec<Arc<Game>> {
        let mut games: Vec<Arc<Game>> = self.visible_games().filter(|g| g.favorite).cloned().collect();
        sort_games(&mut games, SortKey::Name, SortOrder::Asc);
        games
    }

    /// Games played within the last `days` days, newest first
    pub fn get_recently_played(&self, days: u32) -> Vec<Arc<Game>> {
        let cutoff = Local::now().naive_local() - Duration::days(i64::from(days));
        self.recently_played_since(cutoff)
    }

    pub fn recently_played_since(&self, cutoff: NaiveDateTime) -> Vec<Arc<Game>> {
        let mut games: Vec<Arc<Game>> = self
            .visible_games()
            .filter(|g| g.last_played.is_some_and(|t| t >= cutoff))
            .cloned()
            .collect();
        sort_games(&mut games, SortKey::LastPlayed, SortOrder::Desc);
        games
    }

    /// Uniform sample without replacement, capped to the pool size
    pub fn get_random(&self, system_id: Option<&str>, count: usize) -> Vec<Arc<Game>> {
        let pool: Vec<Arc<Game>> = match system_id {
            Some(id) => match self.get_system(id) {
                Some(system) => self.system_games(&system.id),
                None => return Vec::new(),
            },
            None => self.visible_games().cloned().collect(),
        };

        let mut rng = rand::thread_rng();
        pool.choose_multiple(&mut rng, count).cloned().collect()
    }

    /// Apply a change to one game's indexed copy
    pub fn update_game<F>(&mut self, id: &str, change: F) -> Option<Arc<Game>>
    where
        F: FnOnce(&mut Game),
    {
        let current = self.games.get_mut(id)?;
        let mut game = (**current).clone();
        change(&mut game);
        *current = Arc::new(game);
        Some(Arc::clone(current))
    }

    pub fn counts(&self) -> IndexCounts {
        IndexCounts {
            system_count: self.systems.len(),
            accessible_system_count: self.systems.values().filter(|s| s.accessible).count(),
            total_games: self.visible_games().count(),
            favorites_count: self.visible_games().filter(|g| g.favorite).count(),
        }
    }

    fn is_visible(&self, game: &Game) -> bool {
        self.include_hidden || !game.hidden
    }

    fn visible_games(&self) -> impl Iterator<Item = &Arc<Game>> {
        self.games.values().filter(|g| self.is_visible(g))
    }

    fn system_games(&self, system_id: &str) -> Vec<Arc<Game>> {
        self.by_system
            .get(system_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.games.get(id))
                    .filter(|g| self.is_visible(g))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn search_rank(game: &Game, name: &str, needle: &str) -> Option<u8> {
    if name == needle {
        return Some(0);
    }
    if name.starts_with(needle) {
        return Some(1);
    }
    if name.contains(needle) {
        return Some(2);
    }

    let secondary = [
        game.description.as_deref(),
        game.developer.as_deref(),
        game.publisher.as_deref(),
        game.genre.as_deref(),
    ];
    secondary
        .into_iter()
        .flatten()
        .any(|field| field.to_lowercase().contains(needle))
        .then_some(3)
}

/// Absent values sort after present ones in either order
fn cmp_present<T: PartialOrd>(a: Option<T>, b: Option<T>, order: SortOrder) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => order.apply(x.partial_cmp(&y).unwrap_or(Ordering::Equal)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn by_name(a: &Game, b: &Game) -> Ordering {
    a.name
        .to_lowercase()
        .cmp(&b.name.to_lowercase())
        .then_with(|| a.id.cmp(&b.id))
}

fn sort_games(games: &mut [Arc<Game>], key: SortKey, order: SortOrder) {
    if key == SortKey::Random {
        games.shuffle(&mut rand::thread_rng());
        return;
    }

    games.sort_by(|a, b| {
        let primary = match key {
            SortKey::Name => return order.apply(by_name(a, b)),
            SortKey::ReleaseYear => cmp_present(a.release_year(), b.release_year(), order),
            SortKey::Rating => order.apply(a.rating.total_cmp(&b.rating)),
            SortKey::PlayCount => order.apply(a.play_count.cmp(&b.play_count)),
            SortKey::LastPlayed => cmp_present(a.last_played, b.last_played, order),
            SortKey::PlayTime => order.apply(a.play_time.cmp(&b.play_time)),
            SortKey::Random => Ordering::Equal,
        };
        primary.then_with(|| by_name(a, b))
    });
}
