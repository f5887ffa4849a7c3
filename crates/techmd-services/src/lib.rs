//! Technical metadata services
//!
//! Orchestration on top of the tool adapters and the record store: the
//! record builder that characterizes a druid's files and reconciles the
//! result with storage, the audit differ, and the Moab reader that lists a
//! druid's preserved content files. HTTP and queue concerns
//! stay in techmd-api and techmd-worker.

pub mod audit;
pub mod error;
pub mod generator;
pub mod moab;
pub mod notifier;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;

pub use audit::{diff_checksums, AuditService};
pub use error::GenerationError;
pub use generator::{GenerationReport, TechnicalMetadataGenerator};
pub use moab::{MoabError, MoabStorage};
pub use notifier::{CharacterizationFailure, ErrorNotifier, TracingNotifier};
