//! Task handler context trait
//!
//! The API implements this trait for its application state. The worker calls
//! `dispatch_task` for every attempt and `task_failed` once it gives up.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use techmd_core::models::GenerationTask;

/// Context for task dispatch.
///
/// The worker holds a weak reference so the queue does not keep the
/// application state alive.
#[async_trait]
pub trait TaskHandlerContext: Send + Sync {
    /// Run one attempt of `task`. Errors wrapping an unrecoverable
    /// [`TaskError`](techmd_core::TaskError) are not retried.
    async fn dispatch_task(self: Arc<Self>, task: &GenerationTask) -> Result<serde_json::Value>;

    /// Called once when the queue stops retrying `task` (unrecoverable error,
    /// retries exhausted or timeout).
    async fn task_failed(self: Arc<Self>, task: &GenerationTask, error: &anyhow::Error) {
        let _ = (task, error);
    }
}
