//! Per-system game-list (`gamelist.xml`) parsing

use crate::LibraryError;
use crate::metadata::{EntryContext, RawGameEntry};
use crate::model::Game;
use crate::xml::read_records;
use romdex_storage::PathResolver;
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Entry parser options
#[derive(Debug, Clone, Copy, Default)]
pub struct ParseOptions {
    /// Keep entries flagged `<hidden>true</hidden>`
    pub include_hidden: bool,
}

/// Result of parsing one game list
#[derive(Debug, Default)]
pub struct GameList {
    pub games: Vec<Game>,
    /// Entries dropped for missing path or duplicate id
    pub skipped: usize,
    /// Hidden entries left out
    pub hidden: usize,
    /// Syntax error that cut the document short
    pub error: Option<String>,
}

/// Parse a game list from any reader
pub fn parse_entries_from_reader<R: BufRead>(
    reader: R,
    rom_dir: &Path,
    system_id: &str,
    resolver: &PathResolver,
    options: ParseOptions,
) -> GameList {
    let records = read_records(reader, "game");
    let ctx = EntryContext {
        system_id,
        rom_dir,
        resolver,
    };

    let mut list = GameList {
        error: records.error.map(|e| e.to_string()),
        ..Default::default()
    };
    let mut seen = HashSet::new();

    for node in &records.nodes {
        let Some(game) = RawGameEntry::from_node(node).normalize(&ctx) else {
            list.skipped += 1;
            continue;
        };

        if game.hidden && !options.include_hidden {
            list.hidden += 1;
            continue;
        }

        if !seen.insert(game.id.clone()) {
            tracing::debug!("Duplicate entry {} in {} game list", game.path, system_id);
            list.skipped += 1;
            continue;
        }

        list.games.push(game);
    }

    if let Some(err) = &list.error {
        tracing::warn!(
            "Game list for {} is malformed after {} entries: {}",
            system_id,
            records.nodes.len(),
            err
        );
    }

    list
}

/// Parse a game-list document.
///
/// Only an unreadable document is an error; individual bad entries are
/// skipped and counted.
pub fn parse_entries(
    document: &Path,
    rom_dir: &Path,
    system_id: &str,
    resolver: &PathResolver,
    options: ParseOptions,
) -> Result<GameList, LibraryError> {
    let file = File::open(document)?;
    let list = parse_entries_from_reader(BufReader::new(file), rom_dir, system_id, resolver, options);

    tracing::debug!(
        "Parsed {} games for {} ({} skipped, {} hidden)",
        list.games.len(),
        system_id,
        list.skipped,
        list.hidden
    );

    Ok(list)
}
