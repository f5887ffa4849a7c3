//! Record builder: characterizes a druid's files and reconciles the result
//! with what is stored.
//!
//! Files are processed one after another. Every outcome is known before the
//! change set is handed to the store, so either the whole druid is
//! reconciled in one transaction or nothing is written.

pub mod builder;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use techmd_core::models::{ChangeSet, FileInfo, FileRecord, FileRecordUpsert, ReconcileSummary};
use techmd_core::sanitize::strip_nul;
use techmd_db::FileRecordStore;
use techmd_processing::{file_facts, missing_files, Toolkit};

use crate::error::GenerationError;
use crate::notifier::ErrorNotifier;
use builder::{describe, FileContext};

/// What a successful generation pass did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationReport {
    /// Filenames whose metadata was (re)computed.
    pub generated: Vec<String>,
    /// Filenames left alone because the stored md5 already matched.
    pub unchanged: Vec<String>,
    pub summary: ReconcileSummary,
}

#[derive(Clone)]
pub struct TechnicalMetadataGenerator {
    store: Arc<dyn FileRecordStore>,
    toolkit: Toolkit,
    notifier: Arc<dyn ErrorNotifier>,
}

impl TechnicalMetadataGenerator {
    pub fn new(
        store: Arc<dyn FileRecordStore>,
        toolkit: Toolkit,
        notifier: Arc<dyn ErrorNotifier>,
    ) -> Self {
        Self {
            store,
            toolkit,
            notifier,
        }
    }

    /// Generates metadata for every (filepath, filename) pair, all of which
    /// must exist on disk. The filenames are the druid's complete file set;
    /// stored records for other filenames are deleted.
    #[tracing::instrument(skip(self, filepath_map), fields(druid = %druid, files = filepath_map.len()))]
    pub async fn generate(
        &self,
        druid: &str,
        filepath_map: &[(PathBuf, String)],
        force: bool,
    ) -> Result<GenerationReport, GenerationError> {
        let keep = filepath_map
            .iter()
            .map(|(_, filename)| filename.clone())
            .collect();
        self.run(druid, filepath_map, keep, force, GenerationReport::default())
            .await
    }

    /// Like [`generate`](Self::generate), but files whose (filename, md5)
    /// already matches a stored record are skipped without touching disk,
    /// so only the remaining ones have to exist locally.
    #[tracing::instrument(skip(self, file_infos), fields(druid = %druid, files = file_infos.len()))]
    pub async fn generate_with_file_info(
        &self,
        druid: &str,
        file_infos: &[FileInfo],
        force: bool,
    ) -> Result<GenerationReport, GenerationError> {
        let mut report = GenerationReport::default();
        let mut pending = Vec::new();
        for info in file_infos {
            if self
                .store
                .exists_with_md5(druid, &info.filename, &info.md5)
                .await?
            {
                report.unchanged.push(info.filename.clone());
            } else {
                pending.push((info.filepath.clone(), info.filename.clone()));
            }
        }

        let keep = file_infos.iter().map(|info| info.filename.clone()).collect();
        self.run(druid, &pending, keep, force, report).await
    }

    async fn run(
        &self,
        druid: &str,
        filepath_map: &[(PathBuf, String)],
        keep_filenames: Vec<String>,
        force: bool,
        mut report: GenerationReport,
    ) -> Result<GenerationReport, GenerationError> {
        let start = Instant::now();

        let filepaths: Vec<&PathBuf> = filepath_map.iter().map(|(filepath, _)| filepath).collect();
        let missing = missing_files(&filepaths).await;
        if !missing.is_empty() {
            let errors: Vec<String> = missing
                .iter()
                .map(|filepath| format!("{} not found", filepath.display()))
                .collect();
            tracing::warn!(druid = %druid, missing = missing.len(), "Files not found, nothing generated");
            return Err(GenerationError::MissingFiles(errors));
        }

        let mut changes = ChangeSet::new(druid, keep_filenames);
        for (filepath, filename) in filepath_map {
            let existing = self.store.find(druid, filename).await?;
            match self
                .generate_for_file(druid, filepath, filename, existing.as_ref(), force)
                .await
            {
                Ok(Some(upsert)) => {
                    report.generated.push(filename.clone());
                    changes.push(upsert);
                }
                Ok(None) => report.unchanged.push(filename.clone()),
                Err(source) => {
                    let message = format!(
                        "Error generating for {} ({}): {}",
                        filepath.display(),
                        druid,
                        source
                    );
                    tracing::error!(druid = %druid, filename = %filename, error = %source, "Generation aborted");
                    return Err(GenerationError::Failed { message, source });
                }
            }
        }

        report.summary = self.store.apply(changes).await?;

        tracing::info!(
            druid = %druid,
            generated = report.generated.len(),
            unchanged = report.unchanged.len(),
            deleted = report.summary.deleted.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Technical metadata generated"
        );

        Ok(report)
    }

    /// `None` when the stored record is current.
    async fn generate_for_file(
        &self,
        druid: &str,
        filepath: &Path,
        filename: &str,
        existing: Option<&FileRecord>,
        force: bool,
    ) -> anyhow::Result<Option<FileRecordUpsert>> {
        let facts = file_facts(filepath).await?;
        if !needs_generation(existing, &facts.md5, force) {
            tracing::debug!(filename = %filename, "md5 unchanged, skipping");
            return Ok(None);
        }

        let file = FileContext {
            druid,
            filepath,
            filename,
        };
        let description = describe(&self.toolkit, self.notifier.as_ref(), file, facts.bytes).await?;

        let upsert = FileRecordUpsert {
            druid: druid.to_string(),
            filename: filename.to_string(),
            md5: facts.md5,
            bytes: i64::try_from(facts.bytes)?,
            file_modification: facts.modified,
            filetype: description.filetype,
            mimetype: description.mimetype,
            tool_versions: description.tool_versions,
            metadata: description.metadata,
            parts: description.parts,
        };
        Ok(Some(strip_nul(upsert)?))
    }
}

fn needs_generation(existing: Option<&FileRecord>, md5: &str, force: bool) -> bool {
    match existing {
        None => true,
        Some(record) => force || record.md5 != md5,
    }
}

#[cfg(test)]
mod tests;
