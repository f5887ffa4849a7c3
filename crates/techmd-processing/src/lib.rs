//! External tool adapters for technical metadata.
//!
//! Every tool is invoked through [`CommandRunner`] so adapters can be
//! exercised against scripted output. Identification goes through
//! [`Identifier`]; type-specific characterization through [`Characterizer`]
//! strategies selected by mimetype.

pub mod av;
pub mod characterizer;
pub mod checksum;
pub mod command;
pub mod error;
pub mod identifier;
pub mod image;
pub mod pdf;
pub mod toolkit;
pub mod version;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;

pub use av::MediaInfoCharacterizer;
pub use characterizer::{Characterization, Characterizer, CharacterizerSet};
pub use checksum::{file_facts, missing_files, FileFacts};
pub use command::{CommandOutput, CommandRunner, ProcessRunner};
pub use error::{CharacterizationError, ToolError};
pub use identifier::{Identification, Identifier, SiegfriedIdentifier};
pub use image::ExifToolCharacterizer;
pub use pdf::PopplerCharacterizer;
pub use toolkit::{Toolkit, ToolkitBuilder, ToolkitFactory};
