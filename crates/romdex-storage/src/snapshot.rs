//! One-way snapshots of game-list documents
//!
//! Game lists live on the user's ROM storage, which may be a slow network
//! mount. Scans copy each document into a local cache directory and parse
//! the copy. Sources are only ever opened read-only here.

use crate::StorageError;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

/// File name used for every snapshot inside its per-system directory
pub const SNAPSHOT_FILE_NAME: &str = "gamelist.xml";

/// A local copy of a source document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// Where the document was copied from
    pub source: PathBuf,
    /// The local copy
    pub path: PathBuf,
    /// Bytes copied
    pub size: u64,
}

/// Manages the local snapshot directory
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    root: PathBuf,
}

impl SnapshotStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Location of the snapshot for a system
    pub fn path_for(&self, system_id: &str) -> PathBuf {
        self.root.join(system_id).join(SNAPSHOT_FILE_NAME)
    }

    /// Remove every snapshot and recreate an empty root
    pub fn clear(&self) -> Result<(), StorageError> {
        match fs::remove_dir_all(&self.root) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        fs::create_dir_all(&self.root)?;
        Ok(())
    }

    /// Remove the snapshot of a single system, if any
    pub fn remove(&self, system_id: &str) -> Result<(), StorageError> {
        match fs::remove_dir_all(self.root.join(system_id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Copy `source` into the snapshot slot for `system_id`.
    ///
    /// Missing and zero-length sources are rejected; a stale snapshot from a
    /// previous scan is removed in that case so it is never parsed again.
    pub fn take(&self, system_id: &str, source: &Path) -> Result<Snapshot, StorageError> {
        let dest = self.path_for(system_id);

        let mut reader = match File::open(source) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                self.remove(system_id)?;
                return Err(StorageError::SourceMissing(source.to_path_buf()));
            }
            Err(e) => {
                self.remove(system_id)?;
                return Err(e.into());
            }
        };

        if reader.metadata()?.len() == 0 {
            self.remove(system_id)?;
            return Err(StorageError::SourceEmpty(source.to_path_buf()));
        }

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut writer = File::create(&dest)?;
        let size = io::copy(&mut reader, &mut writer)?;

        tracing::debug!(
            "Snapshot {} -> {} ({} bytes)",
            source.display(),
            dest.display(),
            size
        );

        Ok(Snapshot {
            source: source.to_path_buf(),
            path: dest,
            size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_take_copies_bytes() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("source.xml");
        fs::write(&source, b"<gameList></gameList>").unwrap();

        let store = SnapshotStore::new(dir.path().join("cache"));
        let snapshot = store.take("snes", &source).unwrap();

        assert_eq!(snapshot.size, 21);
        assert_eq!(snapshot.path, store.path_for("snes"));
        assert_eq!(fs::read(&snapshot.path).unwrap(), b"<gameList></gameList>");
        // source untouched
        assert_eq!(fs::read(&source).unwrap(), b"<gameList></gameList>");
    }

    #[test]
    fn test_missing_source() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path().join("cache"));

        let err = store.take("nes", &dir.path().join("nope.xml")).unwrap_err();
        assert!(matches!(err, StorageError::SourceMissing(_)));
    }

    #[test]
    fn test_empty_source_removes_stale_snapshot() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("source.xml");
        fs::write(&source, b"<gameList/>").unwrap();

        let store = SnapshotStore::new(dir.path().join("cache"));
        store.take("gba", &source).unwrap();
        assert!(store.path_for("gba").exists());

        fs::write(&source, b"").unwrap();
        let err = store.take("gba", &source).unwrap_err();
        assert!(matches!(err, StorageError::SourceEmpty(_)));
        assert!(!store.path_for("gba").exists());
    }

    #[test]
    fn test_clear() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("source.xml");
        fs::write(&source, b"<gameList/>").unwrap();

        let store = SnapshotStore::new(dir.path().join("cache"));
        store.take("gba", &source).unwrap();
        store.clear().unwrap();

        assert!(store.root().exists());
        assert!(!store.path_for("gba").exists());
    }
}
