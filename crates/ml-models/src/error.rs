use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while fitting or running a classifier.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Invalid training input: {0}")]
    InvalidInput(String),

    #[error("Dimension mismatch: expected {expected} values, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Model failed to fit: {0}")]
    Fit(String),

    #[error("Neural network error: {0}")]
    Network(#[from] candle_core::Error),
}

/// Errors raised while reading or writing the persisted artifact set.
#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("Artifact not found at {0}")]
    NotFound(PathBuf),

    #[error("Artifact at {path} is corrupt: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("Artifact set is incompatible: {0}")]
    Incompatible(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ArtifactError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            ArtifactError::NotFound(path)
        } else {
            ArtifactError::Io { path, source }
        }
    }

    pub(crate) fn corrupt(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        ArtifactError::Corrupt {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}
