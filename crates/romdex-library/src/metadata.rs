//! Game-list entry schema and normalization
//!
//! `RawGameEntry` mirrors a `<game>` element field by field with every value
//! optional and untyped. `normalize` is the only way to get a [`Game`] out of
//! it; all scale conversions and defaults live here.

use crate::model::{Game, MediaRefs, PlayerRange};
use crate::xml::XmlNode;
use chrono::{NaiveDate, NaiveDateTime};
use romdex_storage::{PathResolver, is_accessible_directory, is_accessible_file, short_hash};
use std::path::{Path, PathBuf};

/// A `<game>` element before validation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawGameEntry {
    pub path: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub image: Option<String>,
    pub thumbnail: Option<String>,
    pub video: Option<String>,
    pub marquee: Option<String>,
    pub fanart: Option<String>,
    pub manual: Option<String>,
    pub rating: Option<String>,
    pub release_date: Option<String>,
    pub developer: Option<String>,
    pub publisher: Option<String>,
    pub genre: Option<String>,
    pub players: Option<String>,
    pub play_count: Option<String>,
    pub last_played: Option<String>,
    pub play_time: Option<String>,
    pub hidden: Option<String>,
    pub favorite: Option<String>,
    pub kid_game: Option<String>,
    pub language: Option<String>,
    pub hash: Option<String>,
}

/// What an entry is normalized against
#[derive(Debug, Clone, Copy)]
pub struct EntryContext<'a> {
    pub system_id: &'a str,
    pub rom_dir: &'a Path,
    pub resolver: &'a PathResolver,
}

fn owned(node: &XmlNode, tag: &str) -> Option<String> {
    node.child_text(tag).map(str::to_string)
}

impl RawGameEntry {
    /// Map a `<game>` element onto the schema
    pub fn from_node(node: &XmlNode) -> Self {
        Self {
            path: owned(node, "path"),
            name: owned(node, "name"),
            description: owned(node, "desc"),
            image: owned(node, "image"),
            thumbnail: owned(node, "thumbnail"),
            video: owned(node, "video"),
            marquee: owned(node, "marquee"),
            fanart: owned(node, "fanart"),
            manual: owned(node, "manual"),
            rating: owned(node, "rating"),
            release_date: owned(node, "releasedate"),
            developer: owned(node, "developer"),
            publisher: owned(node, "publisher"),
            genre: owned(node, "genre"),
            players: owned(node, "players"),
            play_count: owned(node, "playcount"),
            last_played: owned(node, "lastplayed"),
            play_time: owned(node, "gametime"),
            hidden: owned(node, "hidden"),
            favorite: owned(node, "favorite"),
            kid_game: owned(node, "kidgame"),
            language: owned(node, "lang"),
            hash: owned(node, "hash")
                .or_else(|| owned(node, "md5"))
                .or_else(|| owned(node, "crc32")),
        }
    }

    /// Validate and convert into a canonical game. `None` when the entry
    /// has no usable path.
    pub fn normalize(self, ctx: &EntryContext<'_>) -> Option<Game> {
        let path = self.path?;
        let key = path_key(&path);
        if key.is_empty() {
            return None;
        }

        let resolved_path = ctx.resolver.resolve(&path, ctx.rom_dir);
        let file_exists = is_accessible_file(&resolved_path) || is_accessible_directory(&resolved_path);
        let name = self
            .name
            .unwrap_or_else(|| name_from_path(&resolved_path));

        let media = MediaRefs {
            image: resolve_media(ctx, self.image.as_deref()),
            thumbnail: resolve_media(ctx, self.thumbnail.as_deref()),
            video: resolve_media(ctx, self.video.as_deref()),
            marquee: resolve_media(ctx, self.marquee.as_deref()),
            fanart: resolve_media(ctx, self.fanart.as_deref()),
            manual: resolve_media(ctx, self.manual.as_deref()),
        };

        Some(Game {
            id: game_id(ctx.system_id, &path),
            system_id: ctx.system_id.to_string(),
            path,
            resolved_path,
            name,
            description: self.description,
            developer: self.developer,
            publisher: self.publisher,
            release_date: self.release_date.as_deref().and_then(parse_es_date),
            genre: self.genre,
            players: parse_players(self.players.as_deref()),
            rating: self.rating.as_deref().map(normalize_rating).unwrap_or(0.0),
            play_count: self
                .play_count
                .as_deref()
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(0),
            last_played: self.last_played.as_deref().and_then(parse_es_date),
            play_time: self
                .play_time
                .as_deref()
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(0),
            hidden: parse_flag(self.hidden.as_deref()),
            favorite: parse_flag(self.favorite.as_deref()),
            kid_game: parse_flag(self.kid_game.as_deref()),
            language: self.language,
            hash: self.hash.map(|h| h.to_lowercase()),
            media,
            file_exists,
        })
    }
}

fn resolve_media(ctx: &EntryContext<'_>, value: Option<&str>) -> Option<PathBuf> {
    value.map(|v| ctx.resolver.resolve(v, ctx.rom_dir))
}

/// Path form used for identity: forward slashes, no leading `./`
fn path_key(path: &str) -> String {
    let normalized = path.trim().replace('\\', "/");
    normalized
        .strip_prefix("./")
        .unwrap_or(&normalized)
        .to_string()
}

/// Library-wide game id: the system id plus a hash of the entry path
pub fn game_id(system_id: &str, path: &str) -> String {
    format!("{}-{}", system_id, short_hash(&path_key(path), 16))
}

/// Fold any rating scale into [0, 1].
///
/// Values above 1 are on the five-star scale and are divided by 5.
/// Unparsable, negative and non-finite values become 0.
pub fn normalize_rating(value: &str) -> f32 {
    let rating: f32 = match value.trim().parse() {
        Ok(r) => r,
        Err(_) => return 0.0,
    };
    if !rating.is_finite() || rating <= 0.0 {
        return 0.0;
    }
    let scaled = if rating > 1.0 { rating / 5.0 } else { rating };
    scaled.clamp(0.0, 1.0)
}

/// Parse `"2"`, `"1-4"`, `"1 - 4"` or `"2+"` into a player range.
///
/// Anything else, including zero, yields 1/1.
pub fn parse_players(value: Option<&str>) -> PlayerRange {
    fn count(s: &str) -> Option<u32> {
        s.trim().trim_end_matches('+').trim().parse().ok().filter(|n| *n > 0)
    }

    let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return PlayerRange::default();
    };

    let parsed = match value.split_once('-') {
        Some((lo, hi)) => count(lo).zip(count(hi)),
        None => count(value).map(|n| (n, n)),
    };

    match parsed {
        Some((a, b)) => PlayerRange {
            min: a.min(b),
            max: a.max(b),
        },
        None => PlayerRange::default(),
    }
}

/// Parse a game-list timestamp.
///
/// Accepts `YYYYMMDDHHMMSS`, the same with a `T` between date and time,
/// or a bare `YYYY` (January 1st of that year).
pub fn parse_es_date(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();

    let compact: String = if value.len() == 15 && value.as_bytes()[8] == b'T' {
        format!("{}{}", &value[..8], &value[9..])
    } else {
        value.to_string()
    };

    if !compact.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let num = |range: std::ops::Range<usize>| compact[range].parse::<u32>().ok();

    match compact.len() {
        14 => {
            let year = compact[0..4].parse::<i32>().ok()?;
            NaiveDate::from_ymd_opt(year, num(4..6)?, num(6..8)?)?.and_hms_opt(
                num(8..10)?,
                num(10..12)?,
                num(12..14)?,
            )
        }
        4 => {
            let year = compact.parse::<i32>().ok()?;
            NaiveDate::from_ymd_opt(year, 1, 1)?.and_hms_opt(0, 0, 0)
        }
        _ => None,
    }
}

/// `true`, `yes` and `1` (any case) are set; everything else is not
pub fn parse_flag(value: Option<&str>) -> bool {
    matches!(
        value.map(|v| v.trim().to_ascii_lowercase()).as_deref(),
        Some("true" | "yes" | "1")
    )
}

/// Display name for an entry without `<name>`: the file stem with dump
/// tags removed
pub fn name_from_path(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let clean = clean_game_name(&stem);
    if clean.is_empty() { stem } else { clean }
}

/// Strip region codes, revision markers and bracketed dump flags
pub fn clean_game_name(name: &str) -> String {
    let mut clean = name.replace('_', " ");

    for (open, close) in [('[', ']'), ('(', ')')] {
        while let Some(start) = clean.find(open) {
            match clean[start..].find(close) {
                Some(len) => {
                    clean = format!("{}{}", &clean[..start], &clean[start + len + 1..]);
                }
                None => break,
            }
        }
    }

    clean.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::read_records;
    use chrono::{Datelike, Timelike};

    fn ctx(resolver: &PathResolver) -> EntryContext<'_> {
        EntryContext {
            system_id: "snes",
            rom_dir: Path::new("/roms/snes"),
            resolver,
        }
    }

    fn resolver() -> PathResolver {
        PathResolver::with_home("/roms", None)
    }

    #[test]
    fn test_rating_above_one_is_five_star_scale() {
        for stars in [1.5_f32, 2.0, 3.5, 4.0, 5.0] {
            let normalized = normalize_rating(&stars.to_string());
            assert!((normalized - stars / 5.0).abs() < 1e-6, "{}", stars);
            assert!((0.0..=1.0).contains(&normalized));
        }
    }

    #[test]
    fn test_rating_at_or_below_one_unchanged() {
        for r in [0.0_f32, 0.1, 0.5, 0.8, 1.0] {
            assert_eq!(normalize_rating(&r.to_string()), r);
        }
        assert!((normalize_rating("4.0") - 0.8).abs() < 1e-6);
        assert_eq!(normalize_rating("0.8"), 0.8);
    }

    #[test]
    fn test_rating_garbage() {
        assert_eq!(normalize_rating("great"), 0.0);
        assert_eq!(normalize_rating("-3"), 0.0);
        assert_eq!(normalize_rating("NaN"), 0.0);
        assert_eq!(normalize_rating("12"), 1.0);
    }

    #[test]
    fn test_players() {
        let cases = [
            (Some("1"), (1, 1)),
            (Some("2"), (2, 2)),
            (Some("1-4"), (1, 4)),
            (Some("1 - 2"), (1, 2)),
            (Some("4-2"), (2, 4)),
            (Some("2+"), (2, 2)),
            (Some("0"), (1, 1)),
            (Some("many"), (1, 1)),
            (Some("1-x"), (1, 1)),
            (Some(""), (1, 1)),
            (None, (1, 1)),
        ];
        for (input, (min, max)) in cases {
            let range = parse_players(input);
            assert_eq!((range.min, range.max), (min, max), "{:?}", input);
            assert!(range.min <= range.max);
        }
    }

    #[test]
    fn test_dates() {
        let d = parse_es_date("19910821T000000").unwrap();
        assert_eq!((d.year(), d.month(), d.day()), (1991, 8, 21));

        let d = parse_es_date("20230115143005").unwrap();
        assert_eq!((d.hour(), d.minute(), d.second()), (14, 30, 5));

        let d = parse_es_date("1994").unwrap();
        assert_eq!((d.year(), d.month(), d.day()), (1994, 1, 1));

        assert!(parse_es_date("1991-08-21").is_none());
        assert!(parse_es_date("19911321T000000").is_none());
        assert!(parse_es_date("91").is_none());
        assert!(parse_es_date("").is_none());
        assert!(parse_es_date("not-a-date").is_none());
    }

    #[test]
    fn test_flags() {
        assert!(parse_flag(Some("true")));
        assert!(parse_flag(Some(" TRUE ")));
        assert!(parse_flag(Some("1")));
        assert!(!parse_flag(Some("false")));
        assert!(!parse_flag(Some("0")));
        assert!(!parse_flag(None));
    }

    #[test]
    fn test_clean_game_name() {
        assert_eq!(clean_game_name("Super Mario World (USA)"), "Super Mario World");
        assert_eq!(clean_game_name("Zelda (Europe) [!]"), "Zelda");
        assert_eq!(clean_game_name("Pokemon Red (U) (Rev 1)"), "Pokemon Red");
        assert_eq!(clean_game_name("street_fighter_2"), "street fighter 2");
        assert_eq!(clean_game_name("Broken (USA"), "Broken (USA");
    }

    #[test]
    fn test_game_id_ignores_dot_prefix() {
        assert_eq!(game_id("nes", "./zelda.nes"), game_id("nes", "zelda.nes"));
        assert_ne!(game_id("nes", "./zelda.nes"), game_id("fds", "./zelda.nes"));
        assert!(game_id("nes", "./zelda.nes").starts_with("nes-"));
    }

    #[test]
    fn test_normalize_full_entry() {
        let xml = r#"<gameList><game>
            <path>./Super Metroid (USA).sfc</path>
            <name>Super Metroid</name>
            <desc>Samus returns.</desc>
            <image>./media/images/sm.png</image>
            <video>~/videos/sm.mp4</video>
            <rating>0.9</rating>
            <releasedate>19940318T000000</releasedate>
            <developer>Nintendo R&amp;D1</developer>
            <players>1</players>
            <playcount>3</playcount>
            <lastplayed>20240102T203000</lastplayed>
            <gametime>5400</gametime>
            <favorite>true</favorite>
            <lang>en</lang>
            <md5>ABCDEF</md5>
        </game></gameList>"#;

        let r = resolver();
        let node = read_records(xml.as_bytes(), "game").nodes.remove(0);
        let game = RawGameEntry::from_node(&node).normalize(&ctx(&r)).unwrap();

        assert_eq!(game.name, "Super Metroid");
        assert_eq!(game.system_id, "snes");
        assert_eq!(
            game.resolved_path,
            PathBuf::from("/roms/snes/Super Metroid (USA).sfc")
        );
        assert_eq!(game.developer.as_deref(), Some("Nintendo R&D1"));
        assert_eq!(game.release_year(), Some(1994));
        assert_eq!(game.play_count, 3);
        assert_eq!(game.play_time, 5400);
        assert!(game.favorite);
        assert!(!game.hidden);
        assert_eq!(game.hash.as_deref(), Some("abcdef"));
        assert_eq!(
            game.media.image,
            Some(PathBuf::from("/roms/snes/media/images/sm.png"))
        );
        assert!(game.media.thumbnail.is_none());
        assert!(game.media.manual.is_none());
        assert!(!game.file_exists);
    }

    #[test]
    fn test_normalize_requires_path() {
        let r = resolver();
        let raw = RawGameEntry {
            name: Some("Nameless".to_string()),
            ..Default::default()
        };
        assert!(raw.normalize(&ctx(&r)).is_none());

        let raw = RawGameEntry {
            path: Some("  ./  ".to_string()),
            ..Default::default()
        };
        assert!(raw.normalize(&ctx(&r)).is_none());
    }

    #[test]
    fn test_normalize_defaults() {
        let r = resolver();
        let raw = RawGameEntry {
            path: Some("./Chrono Trigger (USA) [!].sfc".to_string()),
            ..Default::default()
        };
        let game = raw.normalize(&ctx(&r)).unwrap();

        assert_eq!(game.name, "Chrono Trigger");
        assert_eq!(game.rating, 0.0);
        assert_eq!(game.players, PlayerRange::default());
        assert!(game.release_date.is_none());
        assert!(game.media.is_empty());
    }
}
