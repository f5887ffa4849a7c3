//! Background generation tasks.
//!
//! Tasks are queued per [`Lane`](techmd_core::models::Lane) into bounded
//! channels, each drained by its own worker pool. The API implements
//! [`TaskHandlerContext`] to run a task; this crate owns scheduling,
//! retries, timeouts and per-druid mutual exclusion.

pub mod context;
pub mod queue;
pub mod single_flight;

pub use context::TaskHandlerContext;
pub use queue::{TaskQueue, TaskQueueConfig};
pub use single_flight::{DruidGuard, DruidLocks};
