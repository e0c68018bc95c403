//! Error types for snapshot I/O

use std::path::PathBuf;

/// Result alias used throughout the snapshot crate.
pub type Result<T> = std::result::Result<T, SnapshotError>;

/// Failure while opening or decoding a snapshot shard.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    /// The file could not be opened, or a read ran past its end.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// Shard being read
        path: PathBuf,
        /// Underlying OS error
        #[source]
        source: std::io::Error,
    },

    /// The bytes on disk do not follow the expected framing or header layout.
    #[error("malformed snapshot {path}: {message}")]
    Format {
        /// Shard being read
        path: PathBuf,
        /// What was wrong
        message: String,
    },
}

impl SnapshotError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SnapshotError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn format(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        SnapshotError::Format {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Path of the shard the error refers to.
    pub fn path(&self) -> &std::path::Path {
        match self {
            SnapshotError::Io { path, .. } | SnapshotError::Format { path, .. } => path,
        }
    }
}
