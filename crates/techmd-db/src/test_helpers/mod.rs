//! Test helpers for crates that depend on `FileRecordStore`.
//!
//! No database connection is needed.

pub mod memory_store;

pub use memory_store::MemoryFileRecordStore;
