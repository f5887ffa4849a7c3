use std::path::Path as FsPath;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use techmd_core::filepath::filename_for;
use techmd_core::models::{AuditReport, FileChecksum, FileInfo, GenerationFiles, GenerationTask, Lane};
use techmd_core::AppError;

use crate::error::{HttpAppError, ValidatedJson};
use crate::state::AppState;
use crate::uri::{decode_component, filepath_from_uri};

#[derive(Debug, Deserialize, ToSchema)]
pub struct FileUri {
    /// Usually `file://`; the path is percent-decoded.
    pub uri: String,
    #[serde(default)]
    pub md5: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateTechnicalMetadataRequest {
    pub druid: String,
    pub files: Vec<FileUri>,
    /// Stored filenames are paths relative to this directory.
    #[serde(default)]
    pub basepath: Option<String>,
    #[serde(default)]
    pub force: bool,
    /// `"low"` for the low priority lane.
    #[serde(default, rename = "lane-id")]
    pub lane_id: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CreateTechnicalMetadataResponse {
    pub accepted: bool,
    pub task_id: Uuid,
}

#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct MoabGenerationQuery {
    #[serde(default)]
    pub force: bool,
    /// `"low"` for the low priority lane.
    #[serde(default, rename = "lane-id")]
    pub lane_id: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AuditRequest {
    pub expected_files: Vec<FileChecksum>,
}

fn generation_files(request: &CreateTechnicalMetadataRequest) -> Result<GenerationFiles, AppError> {
    let basepath = request.basepath.as_deref().map(FsPath::new);

    let mut filepath_map = Vec::with_capacity(request.files.len());
    let mut md5s = Vec::with_capacity(request.files.len());
    for file in &request.files {
        let filepath = filepath_from_uri(&file.uri)?;
        let filename = match basepath {
            Some(basepath) => filename_for(&filepath, basepath)?,
            None => filepath.to_string_lossy().into_owned(),
        };
        filepath_map.push((filepath, filename));
        md5s.push(file.md5.clone().filter(|md5| !md5.is_empty()));
    }

    if md5s.iter().all(Option::is_some) {
        let file_infos = filepath_map
            .into_iter()
            .zip(md5s.into_iter().flatten())
            .map(|((filepath, filename), md5)| FileInfo::new(filepath, md5, filename))
            .collect();
        Ok(GenerationFiles::FileInfos(file_infos))
    } else {
        Ok(GenerationFiles::FilepathMap(filepath_map))
    }
}

/// Queue technical metadata generation for a druid's files
#[utoipa::path(
    post,
    path = "/v1/technical-metadata",
    tag = "technical-metadata",
    request_body = CreateTechnicalMetadataRequest,
    responses(
        (status = 200, description = "Generation queued", body = CreateTechnicalMetadataResponse),
        (status = 400, description = "Invalid request", body = techmd_infra::ErrorResponse),
        (status = 503, description = "Queue is full", body = techmd_infra::ErrorResponse)
    )
)]
#[tracing::instrument(skip(state, request), fields(druid = %request.druid, files = request.files.len()))]
pub async fn create(
    State(state): State<Arc<AppState>>,
    ValidatedJson(request): ValidatedJson<CreateTechnicalMetadataRequest>,
) -> Result<Json<CreateTechnicalMetadataResponse>, HttpAppError> {
    if request.druid.trim().is_empty() {
        return Err(AppError::InvalidInput("druid is required".to_string()).into());
    }
    if request.files.is_empty() {
        return Err(AppError::InvalidInput("files must not be empty".to_string()).into());
    }

    let files = generation_files(&request)?;
    let lane = Lane::from_lane_id(request.lane_id.as_deref());
    let task = GenerationTask::new(request.druid, files, request.force, lane);
    let task_id = state.task_queue.submit(task)?;

    Ok(Json(CreateTechnicalMetadataResponse {
        accepted: true,
        task_id,
    }))
}

/// Queue generation for every content file of a druid's latest Moab version
#[utoipa::path(
    post,
    path = "/v1/technical-metadata/moab/{druid}",
    tag = "technical-metadata",
    params(
        ("druid" = String, Path, description = "Object identifier"),
        MoabGenerationQuery
    ),
    responses(
        (status = 200, description = "Generation queued", body = CreateTechnicalMetadataResponse),
        (status = 400, description = "Invalid druid", body = techmd_infra::ErrorResponse),
        (status = 404, description = "No Moab for druid", body = techmd_infra::ErrorResponse),
        (status = 503, description = "Queue is full", body = techmd_infra::ErrorResponse)
    )
)]
#[tracing::instrument(skip(state))]
pub async fn create_from_moab(
    State(state): State<Arc<AppState>>,
    Path(druid): Path<String>,
    Query(query): Query<MoabGenerationQuery>,
) -> Result<Json<CreateTechnicalMetadataResponse>, HttpAppError> {
    let moab = state.moab.clone();
    let lookup = druid.clone();
    let filepath_map = tokio::task::spawn_blocking(move || moab.content_files(&lookup))
        .await
        .map_err(|e| AppError::Internal(format!("Moab lookup panicked: {}", e)))?
        .map_err(AppError::from)?;
    if filepath_map.is_empty() {
        return Err(AppError::InvalidInput(format!("Moab for {} has no content files", druid)).into());
    }

    let files = filepath_map.len();
    let lane = Lane::from_lane_id(query.lane_id.as_deref());
    let task = GenerationTask::new(druid, GenerationFiles::FilepathMap(filepath_map), query.force, lane);
    let task_id = state.task_queue.submit(task)?;
    tracing::info!(files, task_id = %task_id, "Moab generation queued");

    Ok(Json(CreateTechnicalMetadataResponse {
        accepted: true,
        task_id,
    }))
}

/// Stored technical metadata for a druid, ordered by filename
#[utoipa::path(
    get,
    path = "/v1/technical-metadata/druid/{druid}",
    tag = "technical-metadata",
    params(("druid" = String, Path, description = "Object identifier")),
    responses(
        (status = 200, description = "File records with their parts", body = serde_json::Value),
        (status = 404, description = "No records for druid", body = techmd_infra::ErrorResponse)
    )
)]
#[tracing::instrument(skip(state))]
pub async fn show_by_druid(
    State(state): State<Arc<AppState>>,
    Path(druid): Path<String>,
) -> Result<Json<Vec<techmd_core::models::FileRecord>>, HttpAppError> {
    let records = state.store.list_by_druid(&druid).await?;
    if records.is_empty() {
        return Err(AppError::NotFound(format!("No technical metadata for {}", druid)).into());
    }
    Ok(Json(records))
}

/// Compare expected filenames and md5s with the stored records
#[utoipa::path(
    post,
    path = "/v1/technical-metadata/audit/{druid}",
    tag = "technical-metadata",
    params(("druid" = String, Path, description = "Object identifier")),
    request_body = AuditRequest,
    responses(
        (status = 200, description = "Differences between expected and stored files", body = AuditReport),
        (status = 404, description = "No records for druid", body = techmd_infra::ErrorResponse)
    )
)]
#[tracing::instrument(skip(state, request), fields(expected = request.expected_files.len()))]
pub async fn audit_by_druid(
    State(state): State<Arc<AppState>>,
    Path(druid): Path<String>,
    ValidatedJson(request): ValidatedJson<AuditRequest>,
) -> Result<Json<AuditReport>, HttpAppError> {
    let expected = request
        .expected_files
        .iter()
        .map(|file| Ok(FileChecksum::new(decode_component(&file.filename)?, file.md5.clone())))
        .collect::<Result<Vec<_>, AppError>>()?;

    match state.audit.audit(&druid, &expected).await? {
        Some(report) => Ok(Json(report)),
        None => Err(AppError::NotFound(format!("No technical metadata for {}", druid)).into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn request(files: Vec<FileUri>, basepath: Option<&str>) -> CreateTechnicalMetadataRequest {
        CreateTechnicalMetadataRequest {
            druid: "druid:bc123df4567".to_string(),
            files,
            basepath: basepath.map(str::to_string),
            force: false,
            lane_id: None,
        }
    }

    fn file(uri: &str, md5: Option<&str>) -> FileUri {
        FileUri {
            uri: uri.to_string(),
            md5: md5.map(str::to_string),
        }
    }

    #[test]
    fn test_all_md5s_selects_file_info_mode() {
        let files = generation_files(&request(
            vec![
                file("file:///dor/content/0001.html", Some("1711cb9f08a0504e1035d198d08edda9")),
                file("file:///dor/content/dir/foo.txt", Some("4be1a9f251bb9c7dd3343abb94e6e9e1")),
            ],
            Some("/dor/content"),
        ))
        .unwrap();

        assert_eq!(
            files,
            GenerationFiles::FileInfos(vec![
                FileInfo::new("/dor/content/0001.html", "1711cb9f08a0504e1035d198d08edda9", "0001.html"),
                FileInfo::new("/dor/content/dir/foo.txt", "4be1a9f251bb9c7dd3343abb94e6e9e1", "dir/foo.txt"),
            ])
        );
    }

    #[test]
    fn test_missing_md5_selects_filepath_mode() {
        let files = generation_files(&request(
            vec![
                file("file:///dor/content/0001.html", Some("1711cb9f08a0504e1035d198d08edda9")),
                file("file:///dor/content/one%20space.txt", None),
            ],
            Some("/dor/content"),
        ))
        .unwrap();

        assert_eq!(
            files,
            GenerationFiles::FilepathMap(vec![
                (PathBuf::from("/dor/content/0001.html"), "0001.html".to_string()),
                (PathBuf::from("/dor/content/one space.txt"), "one space.txt".to_string()),
            ])
        );
    }

    #[test]
    fn test_without_basepath_filename_is_filepath() {
        let files = generation_files(&request(vec![file("file:///dor/content/0001.html", None)], None)).unwrap();
        assert_eq!(
            files,
            GenerationFiles::FilepathMap(vec![(
                PathBuf::from("/dor/content/0001.html"),
                "/dor/content/0001.html".to_string()
            )])
        );
    }

    #[test]
    fn test_file_outside_basepath_is_rejected() {
        let err = generation_files(&request(
            vec![file("file:///tmp/0001.html", None)],
            Some("/dor/content"),
        ))
        .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }
}
