//! Technical metadata core library
//!
//! Domain models, error types and configuration shared by every techmd crate.

pub mod config;
pub mod error;
pub mod filepath;
pub mod models;
pub mod sanitize;
pub mod task_error;

pub use config::{BaseConfig, Config, TechMdConfig, ToolPaths};
pub use error::{AppError, ErrorMetadata, LogLevel};
pub use task_error::{TaskError, TaskResultExt};
