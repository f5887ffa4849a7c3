use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::metadata::{TrackMetadata, TypeMetadata};

/// Tool name to version string, e.g. `{"siegfried": "1.9.1", "mediainfo": "v21.09"}`.
pub type ToolVersions = BTreeMap<String, String>;

/// Kind of track a file part describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartType {
    Audio,
    Video,
    Other,
    Text,
}

impl PartType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PartType::Audio => "audio",
            PartType::Video => "video",
            PartType::Other => "other",
            PartType::Text => "text",
        }
    }
}

impl fmt::Display for PartType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PartType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "audio" => Ok(PartType::Audio),
            "video" => Ok(PartType::Video),
            "other" => Ok(PartType::Other),
            "text" => Ok(PartType::Text),
            other => Err(format!("unknown part type: {}", other)),
        }
    }
}

/// Stored technical metadata for one file of a druid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: i64,
    pub druid: String,
    pub filename: String,
    pub md5: String,
    pub bytes: i64,
    /// PRONOM format identifier, e.g. `fmt/43`.
    pub filetype: Option<String>,
    pub mimetype: Option<String>,
    #[serde(default)]
    pub tool_versions: ToolVersions,
    #[serde(flatten)]
    pub metadata: TypeMetadata,
    pub file_modification: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Container tracks, ordered by insertion. Empty for non-AV files.
    #[serde(default)]
    pub parts: Vec<FilePart>,
}

/// Stored track of an audio/video container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilePart {
    pub id: i64,
    pub dro_file_id: i64,
    pub part_type: PartType,
    pub part_id: Option<String>,
    /// Declared stream order within the container.
    pub order: Option<i32>,
    pub format: Option<String>,
    #[serde(flatten)]
    pub metadata: TrackMetadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Track produced by characterization, not yet persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewFilePart {
    pub part_type: PartType,
    pub part_id: Option<String>,
    pub order: Option<i32>,
    pub format: Option<String>,
    #[serde(flatten)]
    pub metadata: TrackMetadata,
}

impl NewFilePart {
    pub fn new(part_type: PartType) -> Self {
        Self {
            part_type,
            part_id: None,
            order: None,
            format: None,
            metadata: TrackMetadata::None,
        }
    }
}

/// Full replacement values for one (druid, filename) record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecordUpsert {
    pub druid: String,
    pub filename: String,
    pub md5: String,
    pub bytes: i64,
    pub file_modification: Option<DateTime<Utc>>,
    pub filetype: Option<String>,
    pub mimetype: Option<String>,
    #[serde(default)]
    pub tool_versions: ToolVersions,
    #[serde(flatten)]
    pub metadata: TypeMetadata,
    #[serde(default)]
    pub parts: Vec<NewFilePart>,
}
