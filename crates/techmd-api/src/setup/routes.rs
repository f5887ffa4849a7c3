//! Route configuration and setup

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Json, Router,
};
use tower::limit::ConcurrencyLimitLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_rapidoc::RapiDoc;

use crate::api_doc::ApiDoc;
use crate::handlers;
use crate::state::AppState;

/// File lists for large objects run to thousands of entries.
const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

pub fn setup_routes(state: Arc<AppState>) -> Router {
    let http_concurrency_limit = std::env::var("HTTP_CONCURRENCY_LIMIT")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(1024)
        .max(1);

    Router::new()
        .route(
            "/v1/technical-metadata",
            post(handlers::technical_metadata::create),
        )
        .route(
            "/v1/technical-metadata/moab/{druid}",
            post(handlers::technical_metadata::create_from_moab),
        )
        .route(
            "/v1/technical-metadata/druid/{druid}",
            get(handlers::technical_metadata::show_by_druid),
        )
        .route(
            "/v1/technical-metadata/audit/{druid}",
            post(handlers::technical_metadata::audit_by_druid),
        )
        .route("/health", get(handlers::health::health_check))
        .route("/api/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
        .merge(RapiDoc::new("/api/openapi.json").path("/docs"))
        .layer(ConcurrencyLimitLayer::new(http_concurrency_limit))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
