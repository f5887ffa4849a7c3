//! Image dimensions via exiftool.

use std::ffi::OsStr;
use std::path::Path;
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use techmd_core::models::{ImageMetadata, TypeMetadata};
use tokio::sync::OnceCell;

use crate::characterizer::{Characterization, Characterizer};
use crate::command::{args, CommandRunner};
use crate::error::{CharacterizationError, ToolError};
use crate::version::query_version;

static VERSION_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+\.\d+)").expect("valid regex"));

fn as_dimension(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Parses `exiftool -json` output for the entry describing `filepath`.
/// `None` when exiftool reported neither dimension.
pub fn parse_exiftool(output: &str, filepath: &str) -> Result<Option<ImageMetadata>, ToolError> {
    let entries: Vec<Value> = serde_json::from_str(output).map_err(|e| {
        ToolError::UnexpectedOutput(format!(
            "Unable to parse exiftool output for {}: {}",
            filepath, e
        ))
    })?;

    let entry = entries
        .iter()
        .find(|entry| entry.get("SourceFile").and_then(Value::as_str) == Some(filepath))
        .ok_or_else(|| {
            ToolError::UnexpectedOutput(format!(
                "Unable to find image attributes for {} in: {}",
                filepath, output
            ))
        })?;

    let metadata = ImageMetadata {
        height: as_dimension(entry.get("ImageHeight")),
        width: as_dimension(entry.get("ImageWidth")),
    };
    Ok((!metadata.is_empty()).then_some(metadata))
}

pub struct ExifToolCharacterizer {
    runner: Arc<dyn CommandRunner>,
    program: String,
    version: OnceCell<String>,
}

impl ExifToolCharacterizer {
    pub fn new(runner: Arc<dyn CommandRunner>, program: impl Into<String>) -> Self {
        Self {
            runner,
            program: program.into(),
            version: OnceCell::new(),
        }
    }
}

#[async_trait]
impl Characterizer for ExifToolCharacterizer {
    fn tool_name(&self) -> &'static str {
        "exiftool"
    }

    fn handles(&self, mimetype: &str) -> bool {
        mimetype.starts_with("image/")
    }

    #[tracing::instrument(skip(self), fields(process.executable.name = "exiftool", file.path = %filepath.display()))]
    async fn characterize(&self, filepath: &Path) -> Result<Characterization, CharacterizationError> {
        let path = filepath.to_string_lossy();
        let output = self
            .runner
            .run(
                &self.program,
                &args([
                    OsStr::new("-ImageHeight"),
                    OsStr::new("-ImageWidth"),
                    OsStr::new("-json"),
                    filepath.as_os_str(),
                ]),
            )
            .await?
            .check(format!("Characterizing {}", path))?;

        let metadata = parse_exiftool(&output.stdout, &path)?
            .map(TypeMetadata::Image)
            .unwrap_or_default();
        Ok(Characterization::metadata(metadata))
    }

    async fn version(&self) -> Result<String, CharacterizationError> {
        let version = self
            .version
            .get_or_try_init(|| async {
                query_version(
                    self.runner.as_ref(),
                    &self.program,
                    &args(["-ver"]),
                    &VERSION_PATTERN,
                    "exiftool",
                )
                .await
            })
            .await?;
        Ok(version.clone())
    }
}
