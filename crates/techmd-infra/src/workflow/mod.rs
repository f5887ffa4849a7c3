//! Workflow step reporting
//!
//! After a generation task finishes, the `technical-metadata` step of the
//! druid's `accessionWF` workflow is marked completed or errored.

mod client;
mod logging;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use techmd_core::Config;

pub use client::WorkflowClient;
pub use logging::LoggingWorkflowReporter;

pub const WORKFLOW: &str = "accessionWF";
pub const PROCESS: &str = "technical-metadata";

#[async_trait]
pub trait WorkflowReporter: Send + Sync {
    /// Mark the step completed.
    async fn update_status(&self, druid: &str, elapsed: Duration) -> Result<()>;

    /// Mark the step errored with `error_msg`.
    async fn update_error_status(&self, druid: &str, error_msg: &str) -> Result<()>;
}

pub(crate) fn completed_note(host: &str) -> String {
    format!("Completed by technical-metadata-service on {}.", host)
}

/// Error message for a failed run, `errors` joined with `", "`.
pub fn error_message(host: &str, errors: &[String]) -> String {
    format!(
        "Problem with technical-metadata-service on {}: {}",
        host,
        errors.join(", ")
    )
}

/// Local hostname, or `"unknown"` when it cannot be read.
pub fn local_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string())
}

/// HTTP client when `WORKFLOW_URL` is set, otherwise a reporter that only logs.
pub fn reporter_from_config(config: &Config) -> Result<Arc<dyn WorkflowReporter>> {
    match config.workflow_url() {
        Some(url) => {
            tracing::info!(url = %url, "Reporting workflow steps over HTTP");
            Ok(Arc::new(WorkflowClient::new(url, config.workflow_timeout())?))
        }
        None => {
            tracing::info!("WORKFLOW_URL not set, workflow steps are only logged");
            Ok(Arc::new(LoggingWorkflowReporter::new()))
        }
    }
}
