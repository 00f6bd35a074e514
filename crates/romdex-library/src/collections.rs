//! Custom collections (`custom-<name>.cfg`)
//!
//! A collection file lists one ROM path per line. Lines are matched against
//! the memory index at load time and the result is recorded in the store.

use crate::cache::LibraryCache;
use crate::database::StoredCollection;
use crate::model::Game;
use crate::LibraryError;
use romdex_storage::{PathResolver, to_stable_id};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const PREFIX: &str = "custom-";
const SUFFIX: &str = ".cfg";

/// A custom collection resolved against the index
#[derive(Debug, Clone)]
pub struct CustomCollection {
    pub id: String,
    pub name: String,
    pub source: PathBuf,
    /// Matched games in file order
    pub games: Vec<Arc<Game>>,
    /// Lines that matched no indexed game
    pub unmatched: Vec<String>,
}

/// Collection names found in `dir`, sorted
pub fn list_custom_collections(dir: &Path) -> Result<Vec<String>, LibraryError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut names = Vec::new();
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let file_name = entry.file_name().to_string_lossy().to_string();
        if let Some(name) = collection_name(&file_name) {
            names.push(name.to_string());
        }
    }

    names.sort_by_key(|n| n.to_lowercase());
    Ok(names)
}

/// `custom-Beat em ups.cfg` → `Beat em ups`
fn collection_name(file_name: &str) -> Option<&str> {
    let name = file_name.strip_prefix(PREFIX)?.strip_suffix(SUFFIX)?;
    if name.trim().is_empty() { None } else { Some(name) }
}

pub fn collection_file(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{}{}{}", PREFIX, name, SUFFIX))
}

/// Read a collection file into (line, resolved path) pairs.
///
/// Blank lines and `#` comments are skipped. Relative lines resolve against
/// the ROM root.
pub fn read_collection_file(
    path: &Path,
    resolver: &PathResolver,
) -> Result<Vec<(String, PathBuf)>, LibraryError> {
    let content = fs::read_to_string(path)?;

    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| {
            let resolved = resolver.resolve(line, resolver.roms_root());
            (line.to_string(), resolved)
        })
        .collect())
}

impl LibraryCache {
    /// Names of the custom collections on disk
    pub fn list_custom_collections(&self) -> Result<Vec<String>, LibraryError> {
        if !self.settings.collections_enabled {
            return Ok(Vec::new());
        }
        list_custom_collections(&self.settings.paths.collections)
    }

    /// Load a custom collection by name and record it in the store
    pub async fn load_custom_collection(&self, name: &str) -> Result<CustomCollection, LibraryError> {
        let source = collection_file(&self.settings.paths.collections, name);
        if !self.settings.collections_enabled || !source.is_file() {
            return Err(LibraryError::CollectionNotFound(name.to_string()));
        }

        let lines = {
            let source = source.clone();
            let resolver = self.resolver.clone();
            tokio::task::spawn_blocking(move || read_collection_file(&source, &resolver)).await??
        };

        let paths: Vec<PathBuf> = lines.iter().map(|(_, p)| p.clone()).collect();
        let (games, missing) = self.read_index().games_by_paths(&paths);
        let unmatched: Vec<String> = lines
            .into_iter()
            .filter(|(_, p)| missing.contains(p))
            .map(|(line, _)| line)
            .collect();

        if !unmatched.is_empty() {
            tracing::warn!(
                "Collection {}: {} entries not in the library",
                name,
                unmatched.len()
            );
        }

        let collection = CustomCollection {
            id: to_stable_id(&source.to_string_lossy()),
            name: name.to_string(),
            source,
            games,
            unmatched,
        };

        let stored = StoredCollection {
            id: collection.id.clone(),
            name: collection.name.clone(),
            kind: "custom".to_string(),
            source: Some(collection.source.to_string_lossy().to_string()),
            game_ids: collection.games.iter().map(|g| g.id.clone()).collect(),
        };
        self.with_db(move |db| db.replace_collection(&stored)).await?;

        tracing::info!(
            "Loaded collection {} with {} games",
            collection.name,
            collection.games.len()
        );
        Ok(collection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_collection_name() {
        assert_eq!(collection_name("custom-Beat em ups.cfg"), Some("Beat em ups"));
        assert_eq!(collection_name("custom-.cfg"), None);
        assert_eq!(collection_name("favorites.cfg"), None);
        assert_eq!(collection_name("custom-rpg.txt"), None);
    }

    #[test]
    fn test_list_custom_collections() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("custom-zelda.cfg"), "").unwrap();
        fs::write(dir.path().join("custom-Arcade.cfg"), "").unwrap();
        fs::write(dir.path().join("notes.txt"), "").unwrap();
        fs::create_dir(dir.path().join("custom-dir.cfg")).unwrap();

        let names = list_custom_collections(dir.path()).unwrap();
        assert_eq!(names, vec!["Arcade", "zelda"]);

        assert!(list_custom_collections(&dir.path().join("missing")).unwrap().is_empty());
    }

    #[test]
    fn test_read_collection_file() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("custom-gb.cfg");
        fs::write(
            &file,
            "# my picks\n%ROMPATH%/gb/Tetris.gb\n\n  /abs/Kirby.gb  \ngbc/../gb/Wario.gb\n",
        )
        .unwrap();

        let resolver = PathResolver::with_home("/roms", None);
        let lines = read_collection_file(&file, &resolver).unwrap();
        let paths: Vec<_> = lines.iter().map(|(_, p)| p.clone()).collect();

        assert_eq!(
            paths,
            vec![
                PathBuf::from("/roms/gb/Tetris.gb"),
                PathBuf::from("/abs/Kirby.gb"),
                PathBuf::from("/roms/gb/Wario.gb"),
            ]
        );
        assert_eq!(lines[1].0, "/abs/Kirby.gb");
    }
}
