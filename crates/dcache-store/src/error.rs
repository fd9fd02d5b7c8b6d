use std::path::PathBuf;

use dcache_types::{TypeError, TypeId};

/// Errors from snapshot store and codec operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// I/O error from the underlying filesystem.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The snapshot bytes are malformed.
    #[error("corrupt snapshot: {0}")]
    Corrupt(String),

    /// A snapshot file could not be decoded.
    #[error("corrupt snapshot file {path:?}: {reason}")]
    CorruptFile { path: PathBuf, reason: String },

    /// Operation not valid in the snapshot's current state.
    #[error("invalid snapshot state: {0}")]
    InvalidState(&'static str),

    /// A record did not share the descriptor of the first record.
    #[error("record {index} does not match the snapshot descriptor")]
    InconsistentDescriptor { index: u64 },

    /// The stamp used to publish a snapshot names a different type than the payload.
    #[error("type mismatch: expected {expected}, payload holds {actual:?}")]
    TypeMismatch {
        expected: TypeId,
        actual: Option<TypeId>,
    },

    /// Error reported by the live record source feeding a snapshot.
    #[error("record source error: {0}")]
    Source(String),

    #[error(transparent)]
    Type(#[from] TypeError),
}

impl From<bincode::Error> for StoreError {
    fn from(err: bincode::Error) -> Self {
        match *err {
            bincode::ErrorKind::Io(io) => StoreError::Io(io),
            other => StoreError::Serialization(other.to_string()),
        }
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
