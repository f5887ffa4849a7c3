use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Input descriptor for generation when the caller already knows each file's md5.
///
/// `filepath` need not exist locally if a stored record already carries the
/// same (druid, filename, md5).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub filepath: PathBuf,
    pub md5: String,
    /// Storage key within the druid.
    pub filename: String,
}

impl FileInfo {
    pub fn new(filepath: impl Into<PathBuf>, md5: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            filepath: filepath.into(),
            md5: md5.into(),
            filename: filename.into(),
        }
    }
}
