//! Error taxonomy for the decomposition passes
//!
//! Nothing here is recoverable: every variant aborts the decomposition on all
//! ranks.

use snapshot::SnapshotError;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, DecompositionError>;

/// Why a decomposition failed.
#[derive(Debug, thiserror::Error)]
pub enum DecompositionError {
    /// A shard is missing or unreadable
    #[error("I/O failure: {0}")]
    Io(SnapshotError),

    /// A shard's framing or header is not what the format promises
    #[error("format error: {0}")]
    Format(SnapshotError),

    /// The input cannot be balanced: no particles, a flat axis, or an empty
    /// region that still needs splitting
    #[error("degenerate input: {0}")]
    DegenerateInput(String),

    /// Invalid configuration or rank count
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A particle fell outside every domain box
    #[error("particle at {position:?} is outside every domain")]
    UnownedParticle {
        /// Offending position
        position: [f64; 3],
    },

    /// A broadcast payload could not be encoded or decoded
    #[error("communication failure: {0}")]
    Comm(String),

    /// Another rank failed; this rank stopped at the same collective
    #[error("aborted: {0}")]
    Aborted(String),
}

impl From<SnapshotError> for DecompositionError {
    fn from(e: SnapshotError) -> Self {
        match e {
            SnapshotError::Io { .. } => DecompositionError::Io(e),
            SnapshotError::Format { .. } => DecompositionError::Format(e),
        }
    }
}

impl From<bincode::Error> for DecompositionError {
    fn from(e: bincode::Error) -> Self {
        DecompositionError::Comm(e.to_string())
    }
}
