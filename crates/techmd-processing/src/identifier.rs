//! File format identification with siegfried.

use std::path::Path;
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use tokio::sync::OnceCell;

use crate::command::{args, CommandRunner};
use crate::error::ToolError;
use crate::version::query_version;

static VERSION_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"siegfried (\d+\.\d+\.\d+)").expect("valid regex"));

const GZIP_PUID: &str = "x-fmt/266";
const GZIP_MIMETYPE: &str = "application/gzip";
const WARC_PUID: &str = "fmt/1355";
const WARC_MIMETYPE: &str = "application/warc";
const WARC_GZ_SUFFIX: &str = ".warc.gz";

/// PRONOM format id and mimetype. Both absent when the file is unknown.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identification {
    pub filetype: Option<String>,
    pub mimetype: Option<String>,
}

impl Identification {
    pub fn new(filetype: Option<&str>, mimetype: Option<&str>) -> Self {
        Self {
            filetype: filetype.map(str::to_string),
            mimetype: mimetype.map(str::to_string),
        }
    }
}

#[async_trait]
pub trait Identifier: Send + Sync {
    /// Key under which this tool's version is recorded.
    fn tool_name(&self) -> &'static str;

    async fn identify(&self, filepath: &Path) -> Result<Identification, ToolError>;

    async fn version(&self) -> Result<String, ToolError>;
}

#[derive(Debug, Deserialize)]
struct SfReport {
    #[serde(default)]
    files: Vec<SfFile>,
}

#[derive(Debug, Deserialize)]
struct SfFile {
    filename: String,
    #[serde(default)]
    matches: Vec<SfMatch>,
}

#[derive(Debug, Deserialize)]
struct SfMatch {
    #[serde(default)]
    ns: Option<String>,
    #[serde(default)]
    id: Option<String>,
    /// Only in output from siegfried releases that put the namespace in `id`.
    #[serde(default)]
    puid: Option<String>,
    #[serde(default)]
    mime: Option<String>,
}

impl SfMatch {
    fn pronom_id(&self) -> Option<Option<&str>> {
        if self.ns.as_deref() == Some("pronom") {
            Some(self.id.as_deref())
        } else if self.ns.is_none() && self.id.as_deref() == Some("pronom") {
            Some(self.puid.as_deref())
        } else {
            None
        }
    }
}

fn presence(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

/// Parses `sf -json` output for the entry describing `filepath`.
pub fn parse_report(output: &str, filepath: &str) -> Result<Identification, ToolError> {
    let report: SfReport = serde_json::from_str(output).map_err(|e| {
        ToolError::UnexpectedOutput(format!(
            "Unable to parse siegfried output for {}: {}",
            filepath, e
        ))
    })?;

    for file in report.files.iter().filter(|f| f.filename == filepath) {
        for candidate in &file.matches {
            if let Some(id) = candidate.pronom_id() {
                let filetype = presence(id).filter(|id| *id != "UNKNOWN");
                let mimetype = presence(candidate.mime.as_deref());
                return Ok(Identification::new(filetype, mimetype));
            }
        }
    }

    Err(ToolError::UnexpectedOutput(format!(
        "Unable to find file type for {} in: {}",
        filepath, output
    )))
}

/// siegfried reports gzipped WARCs as plain gzip.
fn correct_warc(identification: Identification, filepath: &Path) -> Identification {
    let is_gzip = identification.filetype.as_deref() == Some(GZIP_PUID)
        && identification.mimetype.as_deref() == Some(GZIP_MIMETYPE);
    let is_warc_name = filepath
        .file_name()
        .map(|name| {
            name.to_string_lossy()
                .to_ascii_lowercase()
                .ends_with(WARC_GZ_SUFFIX)
        })
        .unwrap_or(false);

    if is_gzip && is_warc_name {
        Identification::new(Some(WARC_PUID), Some(WARC_MIMETYPE))
    } else {
        identification
    }
}

/// [`Identifier`] backed by the `sf` command.
pub struct SiegfriedIdentifier {
    runner: Arc<dyn CommandRunner>,
    program: String,
    version: OnceCell<String>,
}

impl SiegfriedIdentifier {
    pub fn new(runner: Arc<dyn CommandRunner>, program: impl Into<String>) -> Self {
        Self {
            runner,
            program: program.into(),
            version: OnceCell::new(),
        }
    }
}

#[async_trait]
impl Identifier for SiegfriedIdentifier {
    fn tool_name(&self) -> &'static str {
        "siegfried"
    }

    #[tracing::instrument(skip(self), fields(process.executable.name = "sf", file.path = %filepath.display()))]
    async fn identify(&self, filepath: &Path) -> Result<Identification, ToolError> {
        let path = filepath.to_string_lossy();
        let output = self
            .runner
            .run(&self.program, &args([std::ffi::OsStr::new("-json"), filepath.as_os_str()]))
            .await?
            .check(format!("Identifying {}", path))?;

        let identification = parse_report(&output.stdout, &path)?;
        let identification = correct_warc(identification, filepath);

        tracing::debug!(
            filetype = ?identification.filetype,
            mimetype = ?identification.mimetype,
            "Identified file"
        );
        Ok(identification)
    }

    async fn version(&self) -> Result<String, ToolError> {
        self.version
            .get_or_try_init(|| async {
                query_version(
                    self.runner.as_ref(),
                    &self.program,
                    &args(["-version"]),
                    &VERSION_PATTERN,
                    "Siegfried",
                )
                .await
            })
            .await
            .cloned()
    }
}
