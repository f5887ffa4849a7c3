//! Technical metadata HTTP service
//!
//! Handlers, application state, task dispatch and setup for the axum server.

mod api_doc;
mod handlers;
mod task_dispatch;
mod uri;

pub mod error;
pub mod setup;
pub mod state;

pub use error::HttpAppError;
pub use state::{AppDependencies, AppState};
pub use techmd_worker::{TaskQueue, TaskQueueConfig};
