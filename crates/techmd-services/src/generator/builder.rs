//! Describes the content of a single file. Holds no state between files.

use std::path::Path;

use techmd_core::models::{NewFilePart, ToolVersions, TypeMetadata};
use techmd_processing::{CharacterizationError, Toolkit};

use crate::notifier::{CharacterizationFailure, ErrorNotifier};

/// Where the file being described belongs.
#[derive(Debug, Clone, Copy)]
pub struct FileContext<'a> {
    pub druid: &'a str,
    pub filepath: &'a Path,
    pub filename: &'a str,
}

/// Everything learned about a file's content. Empty for zero-byte files.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileDescription {
    pub filetype: Option<String>,
    pub mimetype: Option<String>,
    pub tool_versions: ToolVersions,
    pub metadata: TypeMetadata,
    pub parts: Vec<NewFilePart>,
}

/// Identifies the file, then runs the characterizer for its mimetype.
///
/// Identifier failures and fatal characterization errors are returned.
/// Tolerated characterization errors go to `notifier` and the description
/// keeps whatever was gathered before them.
pub async fn describe(
    toolkit: &Toolkit,
    notifier: &dyn ErrorNotifier,
    file: FileContext<'_>,
    bytes: u64,
) -> anyhow::Result<FileDescription> {
    let mut description = FileDescription::default();
    if bytes == 0 {
        return Ok(description);
    }

    let identifier = &toolkit.identifier;
    let identification = identifier.identify(file.filepath).await?;
    description.filetype = identification.filetype;
    description.mimetype = identification.mimetype;
    description
        .tool_versions
        .insert(identifier.tool_name().to_string(), identifier.version().await?);

    let Some(mimetype) = description.mimetype.clone() else {
        return Ok(description);
    };
    let Some(characterizer) = toolkit.characterizers.for_mimetype(&mimetype) else {
        return Ok(description);
    };

    let outcome = match characterizer.characterize(file.filepath).await {
        Ok(characterization) => {
            description.metadata = characterization.metadata;
            description.parts = characterization.parts;
            characterizer.version().await.map(|version| {
                description
                    .tool_versions
                    .insert(characterizer.tool_name().to_string(), version);
            })
        }
        Err(e) => Err(e),
    };

    match outcome {
        Ok(()) => Ok(description),
        Err(e) if e.is_tolerated() => {
            notifier.characterization_failed(&failure(file, &mimetype, &description, &e));
            Ok(description)
        }
        Err(e) => Err(e.into()),
    }
}

fn failure(
    file: FileContext<'_>,
    mimetype: &str,
    description: &FileDescription,
    error: &CharacterizationError,
) -> CharacterizationFailure {
    CharacterizationFailure {
        druid: file.druid.to_string(),
        mimetype: mimetype.to_string(),
        filepath: file.filepath.to_path_buf(),
        filename: file.filename.to_string(),
        tool_versions: description.tool_versions.clone(),
        error: error.to_string(),
    }
}
