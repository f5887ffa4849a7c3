//! Tool invocation errors.

/// A single external tool invocation went wrong.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Failed to execute {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} did not finish within {seconds}s")]
    Timeout { program: String, seconds: u64 },

    /// Non-zero exit. `action` reads like "Identifying /path/file.txt".
    #[error("{action} returned {status}: {output}")]
    Failed {
        action: String,
        status: String,
        output: String,
    },

    /// The tool ran but its output did not contain what was asked for.
    #[error("{0}")]
    UnexpectedOutput(String),
}

/// Failure of a type-specific characterizer.
///
/// Tool failures are tolerated by the record builder: the file is stored
/// with what was gathered so far. A container without a General track is
/// not.
#[derive(Debug, thiserror::Error)]
pub enum CharacterizationError {
    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("Unable to find general track in {0}")]
    MissingGeneralTrack(String),
}

impl CharacterizationError {
    pub fn is_tolerated(&self) -> bool {
        matches!(self, CharacterizationError::Tool(_))
    }
}
