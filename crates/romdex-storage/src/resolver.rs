//! Path resolution for catalog and game-list references
//!
//! Catalog documents refer to ROM directories with placeholders (`%ROMPATH%`,
//! `%HOME%`, `~`) and game lists refer to ROMs and media relative to the ROM
//! directory. Nothing in here returns an error: filesystem failures degrade to
//! `false` or to the best-effort input path.

use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Component, Path, PathBuf};

/// Placeholder for the configured ROM root
pub const ROMPATH_PLACEHOLDER: &str = "%ROMPATH%";

/// Placeholder for the user's home directory
pub const HOME_PLACEHOLDER: &str = "%HOME%";

/// Resolves symbolic and relative paths into absolute locations
#[derive(Debug, Clone)]
pub struct PathResolver {
    roms_root: PathBuf,
    home: Option<PathBuf>,
}

impl PathResolver {
    /// Create a resolver for the given ROM root, using the current user's home
    pub fn new(roms_root: impl Into<PathBuf>) -> Self {
        let home = directories::BaseDirs::new().map(|dirs| dirs.home_dir().to_path_buf());
        Self::with_home(roms_root, home)
    }

    /// Create a resolver with an explicit home directory
    pub fn with_home(roms_root: impl Into<PathBuf>, home: Option<PathBuf>) -> Self {
        let mut resolver = Self {
            roms_root: PathBuf::new(),
            home,
        };
        let root = roms_root.into();
        resolver.roms_root = resolver.expand(&root.to_string_lossy());
        resolver
    }

    /// The ROM root `%ROMPATH%` expands to
    pub fn roms_root(&self) -> &Path {
        &self.roms_root
    }

    /// Resolve `path` against `base`.
    ///
    /// Placeholders and `~` are expanded first. Absolute results are returned
    /// as-is (lexically normalized), anything else is joined onto `base`.
    pub fn resolve(&self, path: &str, base: &Path) -> PathBuf {
        let expanded = self.expand(path.trim());
        let joined = if expanded.is_absolute() {
            expanded
        } else {
            base.join(expanded)
        };
        normalize_lexically(&joined)
    }

    /// Expand placeholders without joining onto any base
    pub fn expand(&self, path: &str) -> PathBuf {
        let path = path.trim();

        if let Some(rest) = path.strip_prefix(ROMPATH_PLACEHOLDER) {
            return join_rest(&self.roms_root, rest);
        }

        if let Some(home) = &self.home {
            if let Some(rest) = path.strip_prefix(HOME_PLACEHOLDER) {
                return join_rest(home, rest);
            }
            if path == "~" {
                return home.clone();
            }
            if let Some(rest) = path.strip_prefix("~/").or_else(|| path.strip_prefix("~\\")) {
                return home.join(rest);
            }
        }

        PathBuf::from(path)
    }
}

fn join_rest(root: &Path, rest: &str) -> PathBuf {
    let rest = rest.trim_start_matches(['/', '\\']);
    if rest.is_empty() {
        root.to_path_buf()
    } else {
        root.join(rest)
    }
}

/// Collapse `.` and `..` components without touching the filesystem
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Follow symlinks and junctions to the real location.
///
/// Returns the input unchanged if the path cannot be canonicalized
/// (missing, permission denied, offline network mount).
pub fn follow_real(path: &Path) -> PathBuf {
    match fs::canonicalize(path) {
        Ok(real) => strip_verbatim(real),
        Err(e) => {
            tracing::debug!("Could not canonicalize {}: {}", path.display(), e);
            path.to_path_buf()
        }
    }
}

#[cfg(windows)]
fn strip_verbatim(path: PathBuf) -> PathBuf {
    let text = path.to_string_lossy();
    match text.strip_prefix(r"\\?\") {
        Some(rest) if !rest.starts_with("UNC") => PathBuf::from(rest),
        _ => path,
    }
}

#[cfg(not(windows))]
fn strip_verbatim(path: PathBuf) -> PathBuf {
    path
}

/// True if `path` is a directory whose entries can be listed
pub fn is_accessible_directory(path: &Path) -> bool {
    match fs::metadata(path) {
        Ok(meta) if meta.is_dir() => fs::read_dir(path).is_ok(),
        _ => false,
    }
}

/// True if `path` is a regular file that can be opened for reading
pub fn is_accessible_file(path: &Path) -> bool {
    match fs::metadata(path) {
        Ok(meta) if meta.is_file() => fs::File::open(path).is_ok(),
        _ => false,
    }
}

/// Lower-case ASCII slug: alphanumerics kept, everything else collapsed to `-`
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut pending_dash = false;

    for ch in input.trim().chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }

    slug
}

/// First `len` hex characters of the SHA-256 of `input`
pub fn short_hash(input: &str, len: usize) -> String {
    let digest = Sha256::digest(input.as_bytes());
    let mut hex = hex::encode(digest);
    hex.truncate(len);
    hex
}

/// Deterministic, collision-resistant key for a path.
///
/// The readable part is the slug of the file stem; the hash covers the
/// whole path (separators normalized) so two files with the same stem in
/// different directories never share an id.
pub fn to_stable_id(path: &str) -> String {
    let normalized = path.trim().replace('\\', "/");
    let stem = Path::new(&normalized)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let slug = slugify(&stem);
    let hash = short_hash(&normalized, 12);

    if slug.is_empty() {
        hash
    } else {
        format!("{}-{}", slug, hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn resolver() -> PathResolver {
        PathResolver::with_home("/roms", Some(PathBuf::from("/home/pi")))
    }

    #[test]
    fn test_expand_placeholders() {
        let r = resolver();
        assert_eq!(r.expand("%ROMPATH%/snes"), PathBuf::from("/roms/snes"));
        assert_eq!(r.expand("%ROMPATH%"), PathBuf::from("/roms"));
        assert_eq!(r.expand("%HOME%/roms"), PathBuf::from("/home/pi/roms"));
        assert_eq!(r.expand("~/roms/nes"), PathBuf::from("/home/pi/roms/nes"));
        assert_eq!(r.expand("~"), PathBuf::from("/home/pi"));
        assert_eq!(r.expand("/opt/roms"), PathBuf::from("/opt/roms"));
    }

    #[test]
    fn test_rom_root_itself_may_use_home() {
        let r = PathResolver::with_home("~/ROMs", Some(PathBuf::from("/home/pi")));
        assert_eq!(r.roms_root(), Path::new("/home/pi/ROMs"));
        assert_eq!(r.expand("%ROMPATH%/gba"), PathBuf::from("/home/pi/ROMs/gba"));
    }

    #[test]
    fn test_resolve_relative_to_base() {
        let r = resolver();
        let base = Path::new("/roms/snes");
        assert_eq!(
            r.resolve("./Super Metroid.sfc", base),
            PathBuf::from("/roms/snes/Super Metroid.sfc")
        );
        assert_eq!(
            r.resolve("media/images/a.png", base),
            PathBuf::from("/roms/snes/media/images/a.png")
        );
        assert_eq!(
            r.resolve("../shared/b.png", base),
            PathBuf::from("/roms/shared/b.png")
        );
        assert_eq!(
            r.resolve("/abs/c.png", base),
            PathBuf::from("/abs/c.png")
        );
    }

    #[test]
    fn test_follow_real_falls_back() {
        let missing = Path::new("/definitely/not/here/zelda.nes");
        assert_eq!(follow_real(missing), missing.to_path_buf());
    }

    #[cfg(unix)]
    #[test]
    fn test_follow_real_symlink() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("real");
        fs::create_dir(&target).unwrap();
        let link = dir.path().join("link");
        std::os::unix::fs::symlink(&target, &link).unwrap();

        assert_eq!(follow_real(&link), fs::canonicalize(&target).unwrap());
    }

    #[test]
    fn test_accessibility() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("game.nes");
        fs::write(&file, b"NES").unwrap();

        assert!(is_accessible_directory(dir.path()));
        assert!(!is_accessible_directory(&file));
        assert!(is_accessible_file(&file));
        assert!(!is_accessible_file(dir.path()));
        assert!(!is_accessible_file(&dir.path().join("missing.nes")));
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Super Nintendo"), "super-nintendo");
        assert_eq!(slugify("  sega-md "), "sega-md");
        assert_eq!(slugify("N64!!"), "n64");
        assert_eq!(slugify("***"), "");
    }

    #[test]
    fn test_stable_id_is_deterministic_and_distinct() {
        let a = to_stable_id("./roms/a/Tetris.gb");
        let b = to_stable_id("./roms/b/Tetris.gb");
        assert_eq!(a, to_stable_id("./roms/a/Tetris.gb"));
        assert_ne!(a, b);
        assert!(a.starts_with("tetris-"));
        assert_eq!(to_stable_id(".\\roms\\a\\Tetris.gb"), a);
    }
}
