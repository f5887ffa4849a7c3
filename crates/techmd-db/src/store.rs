use async_trait::async_trait;
use techmd_core::error::AppError;
use techmd_core::models::{ChangeSet, FileChecksum, FileRecord, ReconcileSummary};

/// Read/write contract for a druid's file records.
#[async_trait]
pub trait FileRecordStore: Send + Sync {
    /// Record for (druid, filename) without its parts.
    async fn find(&self, druid: &str, filename: &str) -> Result<Option<FileRecord>, AppError>;

    /// Whether a record exists for (druid, filename) with exactly this md5.
    async fn exists_with_md5(&self, druid: &str, filename: &str, md5: &str)
        -> Result<bool, AppError>;

    /// All records of a druid ordered by filename, parts included.
    async fn list_by_druid(&self, druid: &str) -> Result<Vec<FileRecord>, AppError>;

    /// Stored (filename, md5) pairs of a druid ordered by filename.
    async fn list_checksums(&self, druid: &str) -> Result<Vec<FileChecksum>, AppError>;

    /// Applies a reconciliation pass atomically: stale records are deleted,
    /// upserts replace or create records along with their parts. On error
    /// nothing is written.
    async fn apply(&self, changes: ChangeSet) -> Result<ReconcileSummary, AppError>;

    /// Connectivity check for health reporting.
    async fn ping(&self) -> Result<(), AppError>;
}
