use std::path::PathBuf;

/// All errors that can be returned by the storage layer.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The storage root or a document file could not be created, read, or
    /// written. Fatal at startup; mid-run it needs operator action.
    #[error("storage unavailable at {}: {source}", path.display())]
    Unavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The write probe read back different bytes than it wrote.
    #[error("storage probe at {} read back unexpected contents", path.display())]
    ProbeMismatch { path: PathBuf },

    /// A persisted document exists but does not parse. Treated as
    /// corruption: the owning component refuses to open.
    #[error("malformed document '{name}': {source}")]
    Malformed {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    /// Serializing a document for a write failed.
    #[error("failed to encode document '{name}': {source}")]
    Encode {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    /// Collection names become file names, so they are restricted to
    /// ASCII alphanumerics, `_` and `-`.
    #[error("invalid collection name '{0}'")]
    InvalidName(String),

    /// A backend-specific failure (blocking task join, poisoned state, etc.).
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StorageError {
    pub(crate) fn unavailable(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StorageError::Unavailable {
            path: path.into(),
            source,
        }
    }
}
