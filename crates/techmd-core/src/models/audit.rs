use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A (filename, md5) pair, as expected by a caller or as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct FileChecksum {
    pub filename: String,
    pub md5: String,
}

impl FileChecksum {
    pub fn new(filename: impl Into<String>, md5: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            md5: md5.into(),
        }
    }
}

/// Differences between a caller's expected file list and stored records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AuditReport {
    /// Expected but not stored, in expected order.
    pub missing_filenames: Vec<String>,
    /// Stored but not expected, in stored order.
    pub unexpected_filenames: Vec<String>,
    /// Stored (filename, md5) for files whose stored md5 differs from the expected one.
    pub mismatched_checksum_file_infos: Vec<FileChecksum>,
}

impl AuditReport {
    pub fn is_clean(&self) -> bool {
        self.missing_filenames.is_empty()
            && self.unexpected_filenames.is_empty()
            && self.mismatched_checksum_file_infos.is_empty()
    }
}
