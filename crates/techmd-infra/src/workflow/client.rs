use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;

use super::{completed_note, local_hostname, WorkflowReporter, PROCESS, WORKFLOW};

/// Updates workflow steps through the workflow service's REST API.
pub struct WorkflowClient {
    http_client: reqwest::Client,
    base_url: String,
    host: String,
}

impl WorkflowClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client for workflow service")?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            host: local_hostname(),
        })
    }

    fn step_url(&self, druid: &str) -> String {
        format!(
            "{}/objects/{}/workflows/{}/{}",
            self.base_url, druid, WORKFLOW, PROCESS
        )
    }

    #[tracing::instrument(skip(self, body), fields(druid = %druid))]
    async fn put_process(&self, druid: &str, body: String) -> Result<()> {
        let url = self.step_url(druid);
        let response = self
            .http_client
            .put(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/xml")
            .body(body)
            .send()
            .await
            .with_context(|| format!("Failed to reach workflow service at {}", url))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("Workflow service returned {} for {}: {}", status, url, text);
        }

        tracing::debug!(status = status.as_u16(), "Workflow step updated");
        Ok(())
    }
}

#[async_trait]
impl WorkflowReporter for WorkflowClient {
    async fn update_status(&self, druid: &str, elapsed: Duration) -> Result<()> {
        let body = format!(
            r#"<process name="{}" status="completed" elapsed="{}" note="{}"/>"#,
            PROCESS,
            elapsed.as_secs_f64(),
            escape_attr(&completed_note(&self.host))
        );
        self.put_process(druid, body).await
    }

    async fn update_error_status(&self, druid: &str, error_msg: &str) -> Result<()> {
        let body = format!(
            r#"<process name="{}" status="error" errorMessage="{}"/>"#,
            PROCESS,
            escape_attr(error_msg)
        );
        self.put_process(druid, body).await
    }
}

fn escape_attr(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
