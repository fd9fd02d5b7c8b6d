use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("record shape mismatch: descriptor has {expected} fields, got {actual} values")]
    RecordShape { expected: usize, actual: usize },

    #[error("invalid type identifier: {0:?}")]
    InvalidTypeId(String),

    #[error("duplicate field in descriptor: {0}")]
    DuplicateField(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Result alias for type operations.
pub type TypeResult<T> = Result<T, TypeError>;
