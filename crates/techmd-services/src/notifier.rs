//! Out-of-band error reporting.
//!
//! Tolerated characterization failures never reach the caller's error list,
//! so they are surfaced here instead.

use std::path::PathBuf;

use serde::Serialize;
use techmd_core::models::ToolVersions;

/// Context of a tolerated characterizer failure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CharacterizationFailure {
    pub druid: String,
    pub mimetype: String,
    pub filepath: PathBuf,
    pub filename: String,
    /// Versions recorded for the file before the failure.
    pub tool_versions: ToolVersions,
    pub error: String,
}

pub trait ErrorNotifier: Send + Sync {
    fn characterization_failed(&self, failure: &CharacterizationFailure);

    /// A generation task for `druid` failed with these errors.
    fn generation_failed(&self, druid: &str, errors: &[String]);
}

/// Emits structured tracing events for an error-tracking sink to pick up.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl ErrorNotifier for TracingNotifier {
    fn characterization_failed(&self, failure: &CharacterizationFailure) {
        tracing::warn!(
            druid = %failure.druid,
            mimetype = %failure.mimetype,
            filepath = %failure.filepath.display(),
            filename = %failure.filename,
            tool_versions = ?failure.tool_versions,
            error = %failure.error,
            "Characterization failed, storing partial metadata"
        );
    }

    fn generation_failed(&self, druid: &str, errors: &[String]) {
        tracing::error!(
            druid = %druid,
            errors = ?errors,
            "Generating technical metadata for {} failed: {}",
            druid,
            errors.join(", ")
        );
    }
}
