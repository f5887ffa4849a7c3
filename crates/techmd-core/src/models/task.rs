use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::file_info::FileInfo;

/// Priority lane a generation task runs on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Lane {
    #[default]
    Default,
    Low,
}

impl Lane {
    /// `"low"` selects the low lane; anything else, including nothing, is default.
    pub fn from_lane_id(lane_id: Option<&str>) -> Self {
        match lane_id {
            Some("low") => Lane::Low,
            _ => Lane::Default,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Lane::Default => "default",
            Lane::Low => "low",
        }
    }
}

impl fmt::Display for Lane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Files a generation task covers, in one of the two input modes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "files", rename_all = "snake_case")]
pub enum GenerationFiles {
    /// On-disk path to storage filename; every file is checksummed.
    FilepathMap(Vec<(PathBuf, String)>),
    /// Caller-declared md5s; matching records are skipped without touching disk.
    FileInfos(Vec<FileInfo>),
}

impl GenerationFiles {
    pub fn len(&self) -> usize {
        match self {
            GenerationFiles::FilepathMap(map) => map.len(),
            GenerationFiles::FileInfos(infos) => infos.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One druid's generation run, as queued.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationTask {
    pub id: Uuid,
    pub druid: String,
    pub files: GenerationFiles,
    pub force: bool,
    pub lane: Lane,
    pub enqueued_at: DateTime<Utc>,
}

impl GenerationTask {
    pub fn new(druid: impl Into<String>, files: GenerationFiles, force: bool, lane: Lane) -> Self {
        Self {
            id: Uuid::new_v4(),
            druid: druid.into(),
            files,
            force,
            lane,
            enqueued_at: Utc::now(),
        }
    }
}
