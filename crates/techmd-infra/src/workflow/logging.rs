use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use super::{completed_note, local_hostname, WorkflowReporter, PROCESS, WORKFLOW};

/// Reporter used when no workflow service is configured.
pub struct LoggingWorkflowReporter {
    host: String,
}

impl LoggingWorkflowReporter {
    pub fn new() -> Self {
        Self {
            host: local_hostname(),
        }
    }
}

impl Default for LoggingWorkflowReporter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WorkflowReporter for LoggingWorkflowReporter {
    async fn update_status(&self, druid: &str, elapsed: Duration) -> Result<()> {
        tracing::info!(
            druid = %druid,
            workflow = WORKFLOW,
            process = PROCESS,
            status = "completed",
            elapsed_secs = elapsed.as_secs_f64(),
            note = %completed_note(&self.host),
            "Workflow step completed"
        );
        Ok(())
    }

    async fn update_error_status(&self, druid: &str, error_msg: &str) -> Result<()> {
        tracing::warn!(
            druid = %druid,
            workflow = WORKFLOW,
            process = PROCESS,
            status = "error",
            error_msg = %error_msg,
            "Workflow step errored"
        );
        Ok(())
    }
}
