//! Storage for technical metadata records.
//!
//! `FileRecordStore` is the read/write contract the services depend on;
//! `FileRecordRepository` implements it on PostgreSQL.

pub mod db;
pub mod store;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;

pub use db::{setup_database, FileRecordRepository};
pub use store::FileRecordStore;
