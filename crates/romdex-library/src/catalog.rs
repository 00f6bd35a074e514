//! Systems catalog (`es_systems.xml`) parsing

use crate::LibraryError;
use crate::model::{CoreDef, EmulatorDef, System};
use crate::xml::{XmlNode, read_records};
use romdex_storage::{PathResolver, follow_real, is_accessible_directory, slugify};
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// A `<core>` element before validation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawCore {
    pub name: Option<String>,
    pub default: Option<String>,
}

/// An `<emulator>` element before validation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawEmulator {
    pub name: Option<String>,
    pub cores: Vec<RawCore>,
}

/// A `<system>` element before validation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawSystemEntry {
    pub name: Option<String>,
    pub full_name: Option<String>,
    pub path: Option<String>,
    pub extension: Option<String>,
    pub command: Option<String>,
    pub platform: Option<String>,
    pub theme: Option<String>,
    pub manufacturer: Option<String>,
    pub release: Option<String>,
    pub hardware: Option<String>,
    pub emulators: Vec<RawEmulator>,
}

fn owned(node: &XmlNode, tag: &str) -> Option<String> {
    node.child_text(tag).map(str::to_string)
}

impl RawCore {
    fn from_node(node: &XmlNode) -> Self {
        Self {
            name: node
                .attr("name")
                .map(str::to_string)
                .or_else(|| node.text().map(str::to_string)),
            default: node.attr("default").map(str::to_string),
        }
    }
}

impl RawEmulator {
    fn from_node(node: &XmlNode) -> Self {
        // cores appear either directly under <emulator> or inside <cores>
        let direct = node.children_named("core");
        let wrapped = node
            .children_named("cores")
            .flat_map(|c| c.children_named("core"));

        Self {
            name: node.attr("name").map(str::to_string).or_else(|| node.text().map(str::to_string)),
            cores: direct.chain(wrapped).map(RawCore::from_node).collect(),
        }
    }
}

impl RawSystemEntry {
    pub fn from_node(node: &XmlNode) -> Self {
        let emulators = node
            .children_named("emulators")
            .flat_map(|e| e.children_named("emulator"))
            .map(RawEmulator::from_node)
            .collect();

        Self {
            name: owned(node, "name"),
            full_name: owned(node, "fullname"),
            path: owned(node, "path"),
            extension: owned(node, "extension"),
            command: owned(node, "command"),
            platform: owned(node, "platform"),
            theme: owned(node, "theme"),
            manufacturer: owned(node, "manufacturer"),
            release: owned(node, "release"),
            hardware: owned(node, "hardware"),
            emulators,
        }
    }

    /// Validate into a system descriptor. `None` when name or path is missing.
    pub fn normalize(self, resolver: &PathResolver, catalog_dir: &Path) -> Option<System> {
        let name = self.name?;
        let id = slugify(&name);
        if id.is_empty() {
            return None;
        }
        let path = self.path?;

        let rom_path = resolver.resolve(&path, catalog_dir);
        let resolved_path = follow_real(&rom_path);
        let accessible = is_accessible_directory(&resolved_path);

        Some(System {
            id,
            full_name: self.full_name.unwrap_or_else(|| name.clone()),
            name,
            manufacturer: self.manufacturer,
            release_year: self.release.as_deref().and_then(parse_year),
            hardware: self.hardware,
            rom_path,
            resolved_path,
            extensions: self
                .extension
                .as_deref()
                .map(normalize_extensions)
                .unwrap_or_default(),
            command: self.command,
            emulators: self
                .emulators
                .into_iter()
                .filter_map(normalize_emulator)
                .collect(),
            platforms: self
                .platform
                .as_deref()
                .map(split_platforms)
                .unwrap_or_default(),
            theme: self.theme,
            accessible,
            game_count: 0,
            last_scanned: None,
        })
    }
}

/// Whitespace (or comma) separated extensions to a lower-case, dot-prefixed
/// set in declaration order
pub fn normalize_extensions(list: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    list.split(|c: char| c.is_whitespace() || c == ',')
        .map(|ext| ext.trim().trim_start_matches('.').to_lowercase())
        .filter(|ext| !ext.is_empty())
        .map(|ext| format!(".{}", ext))
        .filter(|ext| seen.insert(ext.clone()))
        .collect()
}

fn split_platforms(list: &str) -> Vec<String> {
    list.split(',')
        .map(|p| p.trim().to_lowercase())
        .filter(|p| !p.is_empty())
        .collect()
}

fn parse_year(value: &str) -> Option<i32> {
    value.trim().get(..4)?.parse().ok()
}

/// First core marked default keeps the marker. With no marker at all the
/// first core becomes the default.
fn normalize_emulator(raw: RawEmulator) -> Option<EmulatorDef> {
    let name = raw.name?;
    let mut cores: Vec<CoreDef> = raw
        .cores
        .into_iter()
        .filter_map(|core| {
            Some(CoreDef {
                default: crate::metadata::parse_flag(core.default.as_deref()),
                name: core.name?,
            })
        })
        .collect();

    let mut seen_default = false;
    for core in cores.iter_mut() {
        if core.default {
            if seen_default {
                core.default = false;
            }
            seen_default = true;
        }
    }

    Some(EmulatorDef { name, cores })
}

/// Parse a catalog from any reader
pub fn parse_systems_from_reader<R: BufRead>(
    reader: R,
    resolver: &PathResolver,
    catalog_dir: &Path,
) -> Vec<System> {
    let records = read_records(reader, "system");
    if let Some(err) = &records.error {
        tracing::warn!(
            "Catalog is malformed after {} systems: {}",
            records.nodes.len(),
            err
        );
    }

    let mut seen = HashSet::new();
    let mut systems = Vec::with_capacity(records.nodes.len());

    for node in &records.nodes {
        let raw = RawSystemEntry::from_node(node);
        let label = raw.name.clone().unwrap_or_else(|| "<unnamed>".to_string());

        match raw.normalize(resolver, catalog_dir) {
            Some(system) => {
                if !seen.insert(system.id.clone()) {
                    tracing::warn!("Duplicate system {} in catalog, keeping the first", system.id);
                    continue;
                }
                if !system.accessible {
                    tracing::info!(
                        "System {} is not accessible at {}",
                        system.id,
                        system.resolved_path.display()
                    );
                }
                systems.push(system);
            }
            None => tracing::warn!("Skipping catalog entry {}: missing name or path", label),
        }
    }

    systems
}

/// Parse the systems catalog document.
///
/// Only a missing document is an error; bad entries are skipped.
pub fn parse_systems(catalog: &Path, resolver: &PathResolver) -> Result<Vec<System>, LibraryError> {
    let file = match File::open(catalog) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(LibraryError::PathNotFound(catalog.to_path_buf()));
        }
        Err(e) => return Err(e.into()),
    };

    let catalog_dir = catalog.parent().unwrap_or_else(|| Path::new("."));
    let systems = parse_systems_from_reader(BufReader::new(file), resolver, catalog_dir);
    tracing::info!("Parsed {} systems from {}", systems.len(), catalog.display());
    Ok(systems)
}
