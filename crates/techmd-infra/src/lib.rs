//! Shared infrastructure for the technical metadata service:
//! - Telemetry initialization
//! - HTTP error response body
//! - Workflow step reporting

pub mod error;
pub mod telemetry;
pub mod workflow;

pub use error::ErrorResponse;
pub use telemetry::{init_telemetry, shutdown_telemetry};
pub use workflow::{
    reporter_from_config, LoggingWorkflowReporter, WorkflowClient, WorkflowReporter,
};
