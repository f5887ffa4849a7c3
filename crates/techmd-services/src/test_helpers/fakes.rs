use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use techmd_core::models::{
    AvMetadata, ImageMetadata, NewFilePart, PdfMetadata, TypeMetadata,
};
use techmd_processing::{
    Characterization, CharacterizationError, Characterizer, CharacterizerSet, Identification,
    Identifier, ToolError, Toolkit,
};

use crate::notifier::{CharacterizationFailure, ErrorNotifier};

/// Identifier answering from a table keyed by file name, with a fallback.
#[derive(Clone)]
pub struct StaticIdentifier {
    fallback: Result<Identification, String>,
    by_name: Arc<Mutex<HashMap<String, Identification>>>,
    calls: Arc<AtomicUsize>,
}

impl StaticIdentifier {
    pub fn new(identification: Identification) -> Self {
        Self {
            fallback: Ok(identification),
            by_name: Arc::default(),
            calls: Arc::default(),
        }
    }

    /// Every identification fails with `message`.
    pub fn failing(message: &str) -> Self {
        Self {
            fallback: Err(message.to_string()),
            by_name: Arc::default(),
            calls: Arc::default(),
        }
    }

    /// Files whose name is `file_name` get `identification` instead of the fallback.
    pub fn with_file(self, file_name: &str, identification: Identification) -> Self {
        self.by_name
            .lock()
            .unwrap()
            .insert(file_name.to_string(), identification);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Identifier for StaticIdentifier {
    fn tool_name(&self) -> &'static str {
        "siegfried"
    }

    async fn identify(&self, filepath: &Path) -> Result<Identification, ToolError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let name = filepath
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if let Some(identification) = self.by_name.lock().unwrap().get(&name) {
            return Ok(identification.clone());
        }
        self.fallback
            .clone()
            .map_err(ToolError::UnexpectedOutput)
    }

    async fn version(&self) -> Result<String, ToolError> {
        Ok("1.9.1".to_string())
    }
}

#[derive(Clone)]
enum Outcome {
    Characterized(Characterization),
    Tolerated(String),
    MissingGeneral,
}

/// Characterizer returning a canned result for one family of mimetypes.
#[derive(Clone)]
pub struct StubCharacterizer {
    tool_name: &'static str,
    version: &'static str,
    prefix: &'static str,
    outcome: Outcome,
    calls: Arc<AtomicUsize>,
}

impl StubCharacterizer {
    fn new(
        tool_name: &'static str,
        version: &'static str,
        prefix: &'static str,
        outcome: Outcome,
    ) -> Self {
        Self {
            tool_name,
            version,
            prefix,
            outcome,
            calls: Arc::default(),
        }
    }

    /// Handles `image/*` as exiftool would.
    pub fn image(metadata: ImageMetadata) -> Self {
        Self::new(
            "exiftool",
            "11.85",
            "image/",
            Outcome::Characterized(Characterization::metadata(TypeMetadata::Image(metadata))),
        )
    }

    /// Handles `application/pdf` as poppler would.
    pub fn pdf(metadata: PdfMetadata) -> Self {
        Self::new(
            "poppler",
            "0.85.0",
            "application/pdf",
            Outcome::Characterized(Characterization::metadata(TypeMetadata::Pdf(metadata))),
        )
    }

    /// Handles `audio/*` as mediainfo would.
    pub fn audio(metadata: AvMetadata, parts: Vec<NewFilePart>) -> Self {
        Self::new(
            "mediainfo",
            "v19.09",
            "audio/",
            Outcome::Characterized(Characterization {
                metadata: TypeMetadata::Av(metadata),
                parts,
            }),
        )
    }

    /// Handles `video/*` and reports a container without a General track.
    pub fn av_missing_general() -> Self {
        Self::new("mediainfo", "v19.09", "video/", Outcome::MissingGeneral)
    }

    /// Same mimetypes, but every characterization fails with a tool error.
    pub fn failing(mut self) -> Self {
        self.outcome = Outcome::Tolerated(format!("{} exploded", self.tool_name));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Characterizer for StubCharacterizer {
    fn tool_name(&self) -> &'static str {
        self.tool_name
    }

    fn handles(&self, mimetype: &str) -> bool {
        mimetype.starts_with(self.prefix)
    }

    async fn characterize(&self, filepath: &Path) -> Result<Characterization, CharacterizationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.outcome {
            Outcome::Characterized(characterization) => Ok(characterization.clone()),
            Outcome::Tolerated(message) => {
                Err(ToolError::UnexpectedOutput(message.clone()).into())
            }
            Outcome::MissingGeneral => Err(CharacterizationError::MissingGeneralTrack(
                filepath.display().to_string(),
            )),
        }
    }

    async fn version(&self) -> Result<String, CharacterizationError> {
        Ok(self.version.to_string())
    }
}

/// Toolkit sharing state with the given doubles.
pub fn toolkit(identifier: &StaticIdentifier, characterizers: &[&StubCharacterizer]) -> Toolkit {
    let set = characterizers
        .iter()
        .fold(CharacterizerSet::default(), |set, characterizer| {
            set.with(Arc::new((*characterizer).clone()))
        });
    Toolkit::new(Arc::new(identifier.clone()), set)
}

/// Notifier that keeps everything it is told.
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    failures: Arc<Mutex<Vec<CharacterizationFailure>>>,
    generation_failures: Arc<Mutex<Vec<(String, Vec<String>)>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn characterization_failures(&self) -> Vec<CharacterizationFailure> {
        self.failures.lock().unwrap().clone()
    }

    pub fn generation_failures(&self) -> Vec<(String, Vec<String>)> {
        self.generation_failures.lock().unwrap().clone()
    }
}

impl ErrorNotifier for RecordingNotifier {
    fn characterization_failed(&self, failure: &CharacterizationFailure) {
        self.failures.lock().unwrap().push(failure.clone());
    }

    fn generation_failed(&self, druid: &str, errors: &[String]) {
        self.generation_failures
            .lock()
            .unwrap()
            .push((druid.to_string(), errors.to_vec()));
    }
}
