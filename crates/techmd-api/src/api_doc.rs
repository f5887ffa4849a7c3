//! OpenAPI documentation, served at `/api/openapi.json` and rendered at `/docs`.

use utoipa::OpenApi;

use crate::handlers;
use techmd_core::models;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Technical Metadata Service",
        version = "0.1.0",
        description = "Generates, stores and audits technical metadata for the files of digital repository objects."
    ),
    paths(
        handlers::technical_metadata::create,
        handlers::technical_metadata::create_from_moab,
        handlers::technical_metadata::show_by_druid,
        handlers::technical_metadata::audit_by_druid,
        handlers::health::health_check,
    ),
    components(schemas(
        handlers::technical_metadata::CreateTechnicalMetadataRequest,
        handlers::technical_metadata::CreateTechnicalMetadataResponse,
        handlers::technical_metadata::FileUri,
        handlers::technical_metadata::AuditRequest,
        handlers::health::HealthCheckResponse,
        models::AuditReport,
        models::FileChecksum,
        models::Lane,
        techmd_infra::ErrorResponse,
    )),
    tags(
        (name = "technical-metadata", description = "Generation, retrieval and audit of technical metadata"),
        (name = "health", description = "Service health"),
    )
)]
pub struct ApiDoc;
