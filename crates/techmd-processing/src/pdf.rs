//! PDF characterization via poppler's pdfinfo and pdftotext.

use std::ffi::OsStr;
use std::path::Path;
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use techmd_core::models::{PdfMetadata, TypeMetadata};
use tokio::sync::OnceCell;

use crate::characterizer::{Characterization, Characterizer};
use crate::command::{args, CommandRunner};
use crate::error::CharacterizationError;
use crate::version::query_version;

static VERSION_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"pdfinfo version (\d+\.\d+\.\d+)").expect("valid regex"));

/// Parses pdfinfo's `Key:   value` lines. Unknown keys are ignored and
/// `text` is left false.
pub fn parse_pdfinfo(output: &str) -> PdfMetadata {
    let mut metadata = PdfMetadata::default();
    for line in output.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim_start_matches(' ').trim_end();
        match key.to_ascii_lowercase().as_str() {
            "pdf version" => metadata.pdf_version = Some(value.to_string()),
            "pages" => metadata.pages = value.parse().ok(),
            "page size" => metadata.page_size = Some(value.to_string()),
            "tagged" => metadata.tagged = Some(value == "yes"),
            "encrypted" => metadata.encrypted = Some(value == "yes"),
            "javascript" => metadata.javascript = Some(value == "yes"),
            "form" => metadata.form = Some(value != "none"),
            "creator" => metadata.creator = Some(value.to_string()),
            "producer" => metadata.producer = Some(value.to_string()),
            _ => {}
        }
    }
    metadata
}

pub struct PopplerCharacterizer {
    runner: Arc<dyn CommandRunner>,
    pdfinfo: String,
    pdftotext: String,
    version: OnceCell<String>,
}

impl PopplerCharacterizer {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        pdfinfo: impl Into<String>,
        pdftotext: impl Into<String>,
    ) -> Self {
        Self {
            runner,
            pdfinfo: pdfinfo.into(),
            pdftotext: pdftotext.into(),
            version: OnceCell::new(),
        }
    }

    async fn has_text(&self, filepath: &Path) -> Result<bool, CharacterizationError> {
        let output = self
            .runner
            .run(
                &self.pdftotext,
                &args([filepath.as_os_str(), OsStr::new("-")]),
            )
            .await?
            .check(format!("Extracting text from {}", filepath.display()))?;
        Ok(!output.stdout.trim().is_empty())
    }
}

#[async_trait]
impl Characterizer for PopplerCharacterizer {
    fn tool_name(&self) -> &'static str {
        "poppler"
    }

    fn handles(&self, mimetype: &str) -> bool {
        mimetype == "application/pdf"
    }

    #[tracing::instrument(skip(self), fields(process.executable.name = "pdfinfo", file.path = %filepath.display()))]
    async fn characterize(&self, filepath: &Path) -> Result<Characterization, CharacterizationError> {
        let output = self
            .runner
            .run(&self.pdfinfo, &args([filepath.as_os_str()]))
            .await?
            .check(format!("Characterizing {}", filepath.display()))?;

        let mut metadata = parse_pdfinfo(&output.stdout);
        metadata.text = self.has_text(filepath).await?;

        Ok(Characterization::metadata(TypeMetadata::Pdf(metadata)))
    }

    async fn version(&self) -> Result<String, CharacterizationError> {
        let version = self
            .version
            .get_or_try_init(|| async {
                query_version(
                    self.runner.as_ref(),
                    &self.pdfinfo,
                    &args(["-v"]),
                    &VERSION_PATTERN,
                    "poppler",
                )
                .await
            })
            .await?;
        Ok(version.clone())
    }
}
