//! Error taxonomy shared by every component of the labeler.

use std::path::PathBuf;

/// Main error type for the library
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Image file could not be read, decoded or embedded. Aborts the enclosing scan.
    #[error("cannot read image {path}: {reason}")]
    MediaRead { path: PathBuf, reason: String },

    /// Directory missing or not listable
    #[error("cannot access directory {path}: {source}")]
    DirectoryAccess {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Malformed annotation submission or unknown image id
    #[error("validation error: {0}")]
    Validation(String),

    /// Retrain diverged or got malformed tensors
    #[error("training error: {0}")]
    Training(String),

    /// Stored embedding blob has the wrong byte length
    #[error("embedding blob of {len} bytes does not hold {expected} f32 values")]
    Decode { len: usize, expected: usize },

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl Error {
    pub(crate) fn media_read(path: impl Into<PathBuf>, reason: impl std::fmt::Display) -> Self {
        Error::MediaRead {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;
