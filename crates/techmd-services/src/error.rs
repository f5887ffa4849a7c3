use techmd_core::error::{AppError, ErrorMetadata};

/// Why a generation pass wrote nothing.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    /// Inputs absent from disk, one `"{filepath} not found"` entry each.
    /// No file was characterized.
    #[error("{}", .0.join(", "))]
    MissingFiles(Vec<String>),

    /// A file could not be described; the files after it were not attempted.
    #[error("{message}")]
    Failed {
        message: String,
        #[source]
        source: anyhow::Error,
    },

    #[error(transparent)]
    Store(#[from] AppError),
}

impl GenerationError {
    /// Human-readable error list as reported to the workflow service.
    pub fn errors(&self) -> Vec<String> {
        match self {
            GenerationError::MissingFiles(errors) => errors.clone(),
            GenerationError::Failed { message, .. } => vec![message.clone()],
            GenerationError::Store(e) => vec![e.to_string()],
        }
    }

    /// Only storage hiccups are worth retrying; the inputs will not change.
    pub fn is_recoverable(&self) -> bool {
        match self {
            GenerationError::Store(e) => e.is_recoverable(),
            _ => false,
        }
    }
}
