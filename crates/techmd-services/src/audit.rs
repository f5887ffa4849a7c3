use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use techmd_core::error::AppError;
use techmd_core::models::{AuditReport, FileChecksum};
use techmd_db::FileRecordStore;

/// Compares a caller's expected files with the stored ones.
pub fn diff_checksums(expected: &[FileChecksum], stored: &[FileChecksum]) -> AuditReport {
    let stored_names: HashSet<&str> = stored.iter().map(|f| f.filename.as_str()).collect();
    let expected_md5s: HashMap<&str, &str> = expected
        .iter()
        .map(|f| (f.filename.as_str(), f.md5.as_str()))
        .collect();

    AuditReport {
        missing_filenames: expected
            .iter()
            .filter(|f| !stored_names.contains(f.filename.as_str()))
            .map(|f| f.filename.clone())
            .collect(),
        unexpected_filenames: stored
            .iter()
            .filter(|f| !expected_md5s.contains_key(f.filename.as_str()))
            .map(|f| f.filename.clone())
            .collect(),
        mismatched_checksum_file_infos: stored
            .iter()
            .filter(|f| {
                expected_md5s
                    .get(f.filename.as_str())
                    .is_some_and(|md5| *md5 != f.md5)
            })
            .cloned()
            .collect(),
    }
}

#[derive(Clone)]
pub struct AuditService {
    store: Arc<dyn FileRecordStore>,
}

impl AuditService {
    pub fn new(store: Arc<dyn FileRecordStore>) -> Self {
        Self { store }
    }

    /// `None` when nothing is stored for the druid, which is not the same
    /// as a clean report.
    #[tracing::instrument(skip(self, expected), fields(druid = %druid, expected = expected.len()))]
    pub async fn audit(
        &self,
        druid: &str,
        expected: &[FileChecksum],
    ) -> Result<Option<AuditReport>, AppError> {
        let stored = self.store.list_checksums(druid).await?;
        if stored.is_empty() {
            return Ok(None);
        }

        let report = diff_checksums(expected, &stored);
        tracing::debug!(
            missing = report.missing_filenames.len(),
            unexpected = report.unexpected_filenames.len(),
            mismatched = report.mismatched_checksum_file_infos.len(),
            "Audited druid"
        );
        Ok(Some(report))
    }
}
