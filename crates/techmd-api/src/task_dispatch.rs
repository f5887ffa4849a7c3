//! Runs queued generation tasks and reports them to the workflow service.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use async_trait::async_trait;
use serde_json::json;

use techmd_core::models::{GenerationFiles, GenerationTask};
use techmd_core::TaskError;
use techmd_infra::workflow::error_message;
use techmd_services::GenerationError;
use techmd_worker::TaskHandlerContext;

use crate::state::AppState;

#[async_trait]
impl TaskHandlerContext for AppState {
    async fn dispatch_task(self: Arc<Self>, task: &GenerationTask) -> anyhow::Result<serde_json::Value> {
        let start = Instant::now();
        let generator = self.generator();
        let result = match &task.files {
            GenerationFiles::FilepathMap(filepath_map) => {
                generator
                    .generate(&task.druid, filepath_map, task.force)
                    .await
            }
            GenerationFiles::FileInfos(file_infos) => {
                generator
                    .generate_with_file_info(&task.druid, file_infos, task.force)
                    .await
            }
        };

        let report = match result {
            Ok(report) => report,
            Err(e) if e.is_recoverable() => return Err(TaskError::recoverable(e).into()),
            Err(e) => return Err(TaskError::unrecoverable(e).into()),
        };

        self.workflow
            .update_status(&task.druid, start.elapsed())
            .await
            .context("Failed to mark workflow step completed")?;

        Ok(json!({
            "druid": task.druid,
            "generated": report.generated,
            "unchanged": report.unchanged,
            "deleted": report.summary.deleted,
        }))
    }

    async fn task_failed(self: Arc<Self>, task: &GenerationTask, error: &anyhow::Error) {
        let generation_error = error
            .downcast_ref::<TaskError>()
            .and_then(|te| te.inner().downcast_ref::<GenerationError>());

        let errors = match generation_error {
            Some(e) => e.errors(),
            None => vec![error.to_string()],
        };

        // Missing inputs are an expected outcome, anything else goes to error tracking.
        if !matches!(generation_error, Some(GenerationError::MissingFiles(_))) {
            self.notifier.generation_failed(&task.druid, &errors);
        }

        let message = error_message(&self.hostname, &errors);
        if let Err(e) = self
            .workflow
            .update_error_status(&task.druid, &message)
            .await
        {
            tracing::error!(druid = %task.druid, error = %e, "Failed to mark workflow step errored");
        }
    }
}
