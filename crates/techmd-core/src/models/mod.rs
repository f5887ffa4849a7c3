pub mod audit;
pub mod change_set;
pub mod file_info;
pub mod file_record;
pub mod metadata;
pub mod task;

pub use audit::{AuditReport, FileChecksum};
pub use change_set::{stale_filenames, ChangeSet, ReconcileSummary};
pub use file_info::FileInfo;
pub use file_record::{FilePart, FileRecord, FileRecordUpsert, NewFilePart, PartType, ToolVersions};
pub use metadata::{
    AudioMetadata, AvMetadata, ImageMetadata, OtherMetadata, PdfMetadata, TrackMetadata,
    TrackMetadataColumns, TypeMetadata, TypeMetadataColumns, VideoMetadata,
};
pub use task::{GenerationFiles, GenerationTask, Lane};
