//! Content files of a druid's Moab, the versioned preservation layout
//! `{root}/{trunk}/bc/123/df/4567/bc123df4567/v0002/{data,manifests}`.
//!
//! A version's `versionInventory.xml` lists every content file the object
//! has at that version. Bytes are only stored by the version that first
//! added them, which `signatureCatalog.xml` records per file signature.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use techmd_core::error::AppError;
use techmd_core::Config;

const CONTENT_GROUP: &str = "content";
const VERSION_INVENTORY: &str = "versionInventory.xml";
const SIGNATURE_CATALOG: &str = "signatureCatalog.xml";

static DRUID_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:druid:)?([b-df-hjkmnp-tv-z]{2})([0-9]{3})([b-df-hjkmnp-tv-z]{2})([0-9]{4})$")
        .expect("valid regex")
});

static VERSION_DIR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^v(\d+)$").expect("valid regex"));

static TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<(/?)([A-Za-z][\w:.-]*)((?:\s+[\w:.-]+\s*=\s*"[^"]*")*)\s*(/?)>"#)
        .expect("valid regex")
});

static ATTRIBUTE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"([\w:.-]+)\s*=\s*"([^"]*)""#).expect("valid regex"));

#[derive(Debug, thiserror::Error)]
pub enum MoabError {
    #[error("{0} is not a valid druid")]
    InvalidDruid(String),

    #[error("No Moab found for {0}")]
    NotFound(String),

    #[error("Moab for {0} has no versions")]
    NoVersions(String),

    #[error("Failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{} lists {filename} but no signature catalog entry matches it", .manifest.display())]
    Uncataloged { manifest: PathBuf, filename: String },
}

impl From<MoabError> for AppError {
    fn from(err: MoabError) -> Self {
        match err {
            MoabError::InvalidDruid(_) => AppError::InvalidInput(err.to_string()),
            MoabError::NotFound(_) | MoabError::NoVersions(_) => AppError::NotFound(err.to_string()),
            MoabError::Read { .. } | MoabError::Uncataloged { .. } => AppError::Internal(err.to_string()),
        }
    }
}

/// Identifies stored bytes across versions.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Signature {
    size: String,
    md5: String,
}

#[derive(Debug)]
struct InventoryFile {
    signature: Option<Signature>,
    paths: Vec<String>,
}

#[derive(Debug)]
struct CatalogEntry {
    original_version: u32,
    storage_path: String,
}

/// Moab storage roots on the local filesystem.
#[derive(Clone, Debug)]
pub struct MoabStorage {
    roots: Vec<PathBuf>,
    trunk: String,
}

impl MoabStorage {
    pub fn new(roots: Vec<PathBuf>, trunk: impl Into<String>) -> Self {
        Self {
            roots,
            trunk: trunk.into(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.moab_storage_roots().to_vec(),
            config.moab_storage_trunk(),
        )
    }

    /// `bc/123/df/4567/bc123df4567` for `druid:bc123df4567`.
    pub fn druid_tree(druid: &str) -> Result<PathBuf, MoabError> {
        let caps = DRUID_PATTERN
            .captures(druid)
            .ok_or_else(|| MoabError::InvalidDruid(druid.to_string()))?;
        let parts: Vec<&str> = (1..=4).map(|i| &caps[i]).collect();
        let mut tree: PathBuf = parts.iter().collect();
        tree.push(parts.concat());
        Ok(tree)
    }

    /// Object directory under the first root that has one.
    pub fn object_dir(&self, druid: &str) -> Result<PathBuf, MoabError> {
        let tree = Self::druid_tree(druid)?;
        self.roots
            .iter()
            .map(|root| root.join(&self.trunk).join(&tree))
            .find(|dir| dir.is_dir())
            .ok_or_else(|| MoabError::NotFound(druid.to_string()))
    }

    /// (filepath, filename) for every content file of the latest version.
    /// Filenames are paths within the content group.
    #[tracing::instrument(skip(self))]
    pub fn content_files(&self, druid: &str) -> Result<Vec<(PathBuf, String)>, MoabError> {
        let object_dir = self.object_dir(druid)?;
        let version = latest_version(&object_dir)?
            .ok_or_else(|| MoabError::NoVersions(druid.to_string()))?;
        let manifests = object_dir.join(version_dir(version)).join("manifests");

        let inventory_path = manifests.join(VERSION_INVENTORY);
        let inventory = parse_content_inventory(&read(&inventory_path)?);
        let catalog = parse_content_catalog(&read(&manifests.join(SIGNATURE_CATALOG))?);

        let mut files = Vec::new();
        for file in inventory {
            let entry = file.signature.as_ref().and_then(|sig| catalog.get(sig));
            for filename in file.paths {
                let Some(entry) = entry else {
                    return Err(MoabError::Uncataloged {
                        manifest: inventory_path,
                        filename,
                    });
                };
                let filepath = object_dir
                    .join(version_dir(entry.original_version))
                    .join("data")
                    .join(CONTENT_GROUP)
                    .join(&entry.storage_path);
                files.push((filepath, filename));
            }
        }

        tracing::debug!(druid = %druid, version, files = files.len(), "Moab content resolved");
        Ok(files)
    }
}

fn version_dir(version: u32) -> String {
    format!("v{:04}", version)
}

fn read(path: &Path) -> Result<String, MoabError> {
    fs::read_to_string(path).map_err(|source| MoabError::Read {
        path: path.to_path_buf(),
        source,
    })
}

fn latest_version(object_dir: &Path) -> Result<Option<u32>, MoabError> {
    let entries = fs::read_dir(object_dir).map_err(|source| MoabError::Read {
        path: object_dir.to_path_buf(),
        source,
    })?;
    Ok(entries
        .filter_map(Result::ok)
        .filter(|entry| entry.path().is_dir())
        .filter_map(|entry| {
            let name = entry.file_name();
            let caps = VERSION_DIR.captures(name.to_str()?)?;
            caps[1].parse().ok()
        })
        .max())
}

struct Tag<'a> {
    closing: bool,
    name: &'a str,
    attributes: HashMap<&'a str, String>,
    empty: bool,
}

fn tags(xml: &str) -> impl Iterator<Item = Tag<'_>> {
    TAG.captures_iter(xml).map(|caps| {
        let attributes = caps
            .get(3)
            .map(|attrs| {
                ATTRIBUTE
                    .captures_iter(attrs.as_str())
                    .filter_map(|attr| {
                        let name = attr.get(1)?.as_str();
                        Some((name, unescape(attr.get(2)?.as_str())))
                    })
                    .collect()
            })
            .unwrap_or_default();
        Tag {
            closing: !caps[1].is_empty(),
            name: caps.get(2).map_or("", |m| m.as_str()),
            attributes,
            empty: !caps[4].is_empty(),
        }
    })
}

fn signature(tag: &Tag<'_>) -> Option<Signature> {
    Some(Signature {
        size: tag.attributes.get("size")?.clone(),
        md5: tag.attributes.get("md5")?.clone(),
    })
}

/// Files of the content group, in manifest order.
fn parse_content_inventory(xml: &str) -> Vec<InventoryFile> {
    let mut files = Vec::new();
    let mut in_content = false;
    let mut current: Option<InventoryFile> = None;

    for tag in tags(xml) {
        match (tag.name, tag.closing) {
            ("fileGroup", false) => {
                in_content = !tag.empty
                    && tag.attributes.get("groupId").map(String::as_str) == Some(CONTENT_GROUP);
            }
            ("fileGroup", true) => in_content = false,
            ("file", false) if in_content => {
                current = Some(InventoryFile {
                    signature: None,
                    paths: Vec::new(),
                });
            }
            ("fileSignature", false) => {
                if let Some(file) = current.as_mut() {
                    file.signature = signature(&tag);
                }
            }
            ("fileInstance", false) => {
                if let (Some(file), Some(path)) = (current.as_mut(), tag.attributes.get("path")) {
                    file.paths.push(path.clone());
                }
            }
            ("file", true) => files.extend(current.take()),
            _ => {}
        }
    }
    files
}

/// Where each content signature was first stored.
fn parse_content_catalog(xml: &str) -> HashMap<Signature, CatalogEntry> {
    let mut catalog = HashMap::new();
    let mut current: Option<CatalogEntry> = None;

    for tag in tags(xml) {
        match (tag.name, tag.closing) {
            ("entry", false) => {
                current = (tag.attributes.get("groupId").map(String::as_str) == Some(CONTENT_GROUP))
                    .then(|| {
                        Some(CatalogEntry {
                            original_version: tag.attributes.get("originalVersion")?.parse().ok()?,
                            storage_path: tag.attributes.get("storagePath")?.clone(),
                        })
                    })
                    .flatten();
            }
            ("fileSignature", false) => {
                if let (Some(entry), Some(sig)) = (current.take(), signature(&tag)) {
                    catalog.insert(sig, entry);
                }
            }
            ("entry", true) => current = None,
            _ => {}
        }
    }
    catalog
}

/// Resolves the predefined and numeric character references of an
/// attribute value. Unknown references are kept as written.
fn unescape(value: &str) -> String {
    if !value.contains('&') {
        return value.to_string();
    }

    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        let decoded = tail.find(';').and_then(|end| {
            let entity = &tail[1..end];
            let c = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                _ => entity
                    .strip_prefix("#x")
                    .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                    .or_else(|| entity.strip_prefix('#').and_then(|dec| dec.parse().ok()))
                    .and_then(char::from_u32),
            };
            c.map(|c| (c, end))
        });
        match decoded {
            Some((c, end)) => {
                out.push(c);
                rest = &tail[end + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}
