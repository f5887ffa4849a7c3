use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use techmd_core::models::{NewFilePart, TypeMetadata};

use crate::error::CharacterizationError;

/// Output of a type-specific characterizer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Characterization {
    pub metadata: TypeMetadata,
    /// Container tracks; only the AV characterizer produces these.
    pub parts: Vec<NewFilePart>,
}

impl Characterization {
    pub fn metadata(metadata: TypeMetadata) -> Self {
        Self {
            metadata,
            parts: Vec::new(),
        }
    }
}

/// One external tool that knows how to describe a class of mimetypes.
#[async_trait]
pub trait Characterizer: Send + Sync {
    /// Key under which this tool's version is recorded.
    fn tool_name(&self) -> &'static str;

    fn handles(&self, mimetype: &str) -> bool;

    async fn characterize(&self, filepath: &Path) -> Result<Characterization, CharacterizationError>;

    async fn version(&self) -> Result<String, CharacterizationError>;
}

/// Ordered characterizers; the first that handles a mimetype is used.
/// Mimetypes nobody handles get identification only.
#[derive(Clone, Default)]
pub struct CharacterizerSet {
    characterizers: Vec<Arc<dyn Characterizer>>,
}

impl CharacterizerSet {
    pub fn new(characterizers: Vec<Arc<dyn Characterizer>>) -> Self {
        Self { characterizers }
    }

    pub fn with(mut self, characterizer: Arc<dyn Characterizer>) -> Self {
        self.characterizers.push(characterizer);
        self
    }

    pub fn for_mimetype(&self, mimetype: &str) -> Option<&Arc<dyn Characterizer>> {
        self.characterizers.iter().find(|c| c.handles(mimetype))
    }

    pub fn len(&self) -> usize {
        self.characterizers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.characterizers.is_empty()
    }
}
