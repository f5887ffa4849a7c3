use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Transaction};
use techmd_core::error::AppError;
use techmd_core::models::{
    stale_filenames, AudioMetadata, AvMetadata, ChangeSet, FileChecksum, FilePart, FileRecord,
    FileRecordUpsert, ImageMetadata, NewFilePart, OtherMetadata, PartType, PdfMetadata,
    ReconcileSummary, ToolVersions, TrackMetadataColumns, TypeMetadataColumns, VideoMetadata,
};

use crate::store::FileRecordStore;

const FILE_RECORD_COLUMNS: &str = "id, druid, filename, md5, bytes, filetype, mimetype, \
    tool_versions, image_metadata, pdf_metadata, av_metadata, file_modification, \
    created_at, updated_at";

const FILE_PART_COLUMNS: &str = "id, dro_file_id, part_type, part_id, \"order\", format, \
    audio_metadata, video_metadata, other_metadata, created_at, updated_at";

/// Row type for the dro_files table.
#[derive(Debug, sqlx::FromRow)]
struct FileRecordRow {
    id: i64,
    druid: String,
    filename: String,
    md5: String,
    bytes: i64,
    filetype: Option<String>,
    mimetype: Option<String>,
    tool_versions: Option<Json<ToolVersions>>,
    image_metadata: Option<Json<ImageMetadata>>,
    pdf_metadata: Option<Json<PdfMetadata>>,
    av_metadata: Option<Json<AvMetadata>>,
    file_modification: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl FileRecordRow {
    fn into_record(self, parts: Vec<FilePart>) -> FileRecord {
        let metadata = TypeMetadataColumns {
            image_metadata: self.image_metadata.map(|m| m.0),
            pdf_metadata: self.pdf_metadata.map(|m| m.0),
            av_metadata: self.av_metadata.map(|m| m.0),
        };
        FileRecord {
            id: self.id,
            druid: self.druid,
            filename: self.filename,
            md5: self.md5,
            bytes: self.bytes,
            filetype: self.filetype,
            mimetype: self.mimetype,
            tool_versions: self.tool_versions.map(|v| v.0).unwrap_or_default(),
            metadata: metadata.into(),
            file_modification: self.file_modification,
            created_at: self.created_at,
            updated_at: self.updated_at,
            parts,
        }
    }
}

/// Row type for the dro_file_parts table.
#[derive(Debug, sqlx::FromRow)]
struct FilePartRow {
    id: i64,
    dro_file_id: i64,
    part_type: String,
    part_id: Option<String>,
    order: Option<i32>,
    format: Option<String>,
    audio_metadata: Option<Json<AudioMetadata>>,
    video_metadata: Option<Json<VideoMetadata>>,
    other_metadata: Option<Json<OtherMetadata>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<FilePartRow> for FilePart {
    type Error = AppError;

    fn try_from(row: FilePartRow) -> Result<Self, Self::Error> {
        let part_type: PartType = row.part_type.parse().map_err(|e| {
            AppError::Internal(format!("dro_file_parts row {}: {}", row.id, e))
        })?;
        let metadata = TrackMetadataColumns {
            audio_metadata: row.audio_metadata.map(|m| m.0),
            video_metadata: row.video_metadata.map(|m| m.0),
            other_metadata: row.other_metadata.map(|m| m.0),
        };
        Ok(FilePart {
            id: row.id,
            dro_file_id: row.dro_file_id,
            part_type,
            part_id: row.part_id,
            order: row.order,
            format: row.format,
            metadata: metadata.into(),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Clone)]
pub struct FileRecordRepository {
    pool: PgPool,
}

impl FileRecordRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    #[tracing::instrument(skip(self, record_ids), fields(db.table = "dro_file_parts", db.operation = "select"))]
    async fn parts_for(&self, record_ids: &[i64]) -> Result<HashMap<i64, Vec<FilePart>>, AppError> {
        if record_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let query = format!(
            "SELECT {} FROM dro_file_parts WHERE dro_file_id = ANY($1) ORDER BY dro_file_id, id",
            FILE_PART_COLUMNS
        );
        let rows = sqlx::query_as::<Postgres, FilePartRow>(&query)
            .bind(record_ids)
            .fetch_all(&self.pool)
            .await?;

        let mut parts: HashMap<i64, Vec<FilePart>> = HashMap::new();
        for row in rows {
            let part = FilePart::try_from(row)?;
            parts.entry(part.dro_file_id).or_default().push(part);
        }
        Ok(parts)
    }

    /// Inserts or replaces one record inside `tx`. Returns the record id and
    /// whether it was newly created.
    async fn upsert_tx(
        tx: &mut Transaction<'_, Postgres>,
        upsert: &FileRecordUpsert,
        now: DateTime<Utc>,
    ) -> Result<(i64, bool), AppError> {
        let columns = TypeMetadataColumns::from(upsert.metadata.clone());

        let (id, inserted) = sqlx::query_as::<Postgres, (i64, bool)>(
            r#"
            INSERT INTO dro_files (
                druid, filename, md5, bytes, filetype, mimetype, tool_versions,
                image_metadata, pdf_metadata, av_metadata, file_modification,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $12)
            ON CONFLICT (druid, filename) DO UPDATE SET
                md5 = EXCLUDED.md5,
                bytes = EXCLUDED.bytes,
                filetype = EXCLUDED.filetype,
                mimetype = EXCLUDED.mimetype,
                tool_versions = EXCLUDED.tool_versions,
                image_metadata = EXCLUDED.image_metadata,
                pdf_metadata = EXCLUDED.pdf_metadata,
                av_metadata = EXCLUDED.av_metadata,
                file_modification = EXCLUDED.file_modification,
                updated_at = EXCLUDED.updated_at
            RETURNING id, (xmax = 0) AS inserted
            "#,
        )
        .bind(&upsert.druid)
        .bind(&upsert.filename)
        .bind(&upsert.md5)
        .bind(upsert.bytes)
        .bind(&upsert.filetype)
        .bind(&upsert.mimetype)
        .bind(Json(&upsert.tool_versions))
        .bind(columns.image_metadata.as_ref().map(Json))
        .bind(columns.pdf_metadata.as_ref().map(Json))
        .bind(columns.av_metadata.as_ref().map(Json))
        .bind(upsert.file_modification)
        .bind(now)
        .fetch_one(&mut **tx)
        .await?;

        if !inserted {
            sqlx::query("DELETE FROM dro_file_parts WHERE dro_file_id = $1")
                .bind(id)
                .execute(&mut **tx)
                .await?;
        }

        for part in &upsert.parts {
            Self::insert_part_tx(tx, id, part, now).await?;
        }

        Ok((id, inserted))
    }

    async fn insert_part_tx(
        tx: &mut Transaction<'_, Postgres>,
        dro_file_id: i64,
        part: &NewFilePart,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let columns = TrackMetadataColumns::from(part.metadata.clone());

        sqlx::query(
            r#"
            INSERT INTO dro_file_parts (
                dro_file_id, part_type, part_id, "order", format,
                audio_metadata, video_metadata, other_metadata, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9)
            "#,
        )
        .bind(dro_file_id)
        .bind(part.part_type.as_str())
        .bind(&part.part_id)
        .bind(part.order)
        .bind(&part.format)
        .bind(columns.audio_metadata.as_ref().map(Json))
        .bind(columns.video_metadata.as_ref().map(Json))
        .bind(columns.other_metadata.as_ref().map(Json))
        .bind(now)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl FileRecordStore for FileRecordRepository {
    #[tracing::instrument(skip(self), fields(db.table = "dro_files", db.operation = "select"))]
    async fn find(&self, druid: &str, filename: &str) -> Result<Option<FileRecord>, AppError> {
        let query = format!(
            "SELECT {} FROM dro_files WHERE druid = $1 AND filename = $2",
            FILE_RECORD_COLUMNS
        );
        let row = sqlx::query_as::<Postgres, FileRecordRow>(&query)
            .bind(druid)
            .bind(filename)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|row| row.into_record(Vec::new())))
    }

    #[tracing::instrument(skip(self), fields(db.table = "dro_files", db.operation = "select"))]
    async fn exists_with_md5(
        &self,
        druid: &str,
        filename: &str,
        md5: &str,
    ) -> Result<bool, AppError> {
        let exists = sqlx::query_scalar::<Postgres, bool>(
            "SELECT EXISTS(SELECT 1 FROM dro_files WHERE druid = $1 AND filename = $2 AND md5 = $3)",
        )
        .bind(druid)
        .bind(filename)
        .bind(md5)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    #[tracing::instrument(skip(self), fields(db.table = "dro_files", db.operation = "select"))]
    async fn list_by_druid(&self, druid: &str) -> Result<Vec<FileRecord>, AppError> {
        let query = format!(
            "SELECT {} FROM dro_files WHERE druid = $1 ORDER BY filename",
            FILE_RECORD_COLUMNS
        );
        let rows = sqlx::query_as::<Postgres, FileRecordRow>(&query)
            .bind(druid)
            .fetch_all(&self.pool)
            .await?;

        let ids: Vec<i64> = rows.iter().map(|row| row.id).collect();
        let mut parts = self.parts_for(&ids).await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let record_parts = parts.remove(&row.id).unwrap_or_default();
                row.into_record(record_parts)
            })
            .collect())
    }

    #[tracing::instrument(skip(self), fields(db.table = "dro_files", db.operation = "select"))]
    async fn list_checksums(&self, druid: &str) -> Result<Vec<FileChecksum>, AppError> {
        let rows = sqlx::query_as::<Postgres, (String, String)>(
            "SELECT filename, md5 FROM dro_files WHERE druid = $1 ORDER BY filename",
        )
        .bind(druid)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(filename, md5)| FileChecksum { filename, md5 })
            .collect())
    }

    #[tracing::instrument(
        skip(self, changes),
        fields(
            db.table = "dro_files",
            db.operation = "reconcile",
            druid = %changes.druid,
            upserts = changes.upserts.len()
        )
    )]
    async fn apply(&self, changes: ChangeSet) -> Result<ReconcileSummary, AppError> {
        if let Some(stray) = changes.upserts.iter().find(|u| u.druid != changes.druid) {
            return Err(AppError::InvalidInput(format!(
                "upsert for {} does not belong to {}",
                stray.druid, changes.druid
            )));
        }

        let mut tx = self.pool.begin().await?;

        // Locks the druid's existing rows so the stale set cannot shift underneath us.
        let stored = sqlx::query_scalar::<Postgres, String>(
            "SELECT filename FROM dro_files WHERE druid = $1 ORDER BY filename FOR UPDATE",
        )
        .bind(&changes.druid)
        .fetch_all(&mut *tx)
        .await?;

        let deleted = stale_filenames(stored.iter().map(String::as_str), &changes.keep_filenames);
        if !deleted.is_empty() {
            sqlx::query("DELETE FROM dro_files WHERE druid = $1 AND filename = ANY($2)")
                .bind(&changes.druid)
                .bind(&deleted)
                .execute(&mut *tx)
                .await?;
        }

        let now = Utc::now();
        let mut summary = ReconcileSummary {
            deleted,
            ..Default::default()
        };
        for upsert in &changes.upserts {
            let (_, inserted) = Self::upsert_tx(&mut tx, upsert, now).await?;
            if inserted {
                summary.inserted += 1;
            } else {
                summary.updated += 1;
            }
        }

        tx.commit().await?;

        tracing::info!(
            druid = %changes.druid,
            inserted = summary.inserted,
            updated = summary.updated,
            deleted = summary.deleted.len(),
            "Reconciled file records"
        );

        Ok(summary)
    }

    async fn ping(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
