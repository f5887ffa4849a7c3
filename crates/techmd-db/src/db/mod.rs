//! PostgreSQL repositories and pool setup.

pub mod file_record;
pub mod pool;

pub use file_record::FileRecordRepository;
pub use pool::setup_database;
