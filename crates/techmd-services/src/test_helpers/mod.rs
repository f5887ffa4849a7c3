//! Test doubles for the record builder's collaborators.

mod fakes;
mod moab;

pub use fakes::{toolkit, RecordingNotifier, StaticIdentifier, StubCharacterizer};
pub use moab::write_moab;
pub use techmd_db::test_helpers::MemoryFileRecordStore;
