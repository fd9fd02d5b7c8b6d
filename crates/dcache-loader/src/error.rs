use dcache_types::TypeId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("query for {type_id} failed: {reason}")]
    Query { type_id: TypeId, reason: String },

    #[error("reading records of {type_id} failed: {reason}")]
    Record { type_id: TypeId, reason: String },

    #[error("no metadata for type {0}")]
    MetadataNotFound(TypeId),

    #[error("no local snapshot for type {0}")]
    SnapshotMissing(TypeId),

    #[error("download failed: {0}")]
    Download(String),

    #[error("invalid loader state: {0}")]
    InvalidState(&'static str),

    #[error("store error: {0}")]
    Store(#[from] dcache_store::StoreError),

    #[error("pack error: {0}")]
    Pack(#[from] dcache_pack::PackError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl LoadError {
    /// The entity type the error is tagged with, if any.
    pub fn type_id(&self) -> Option<&TypeId> {
        match self {
            LoadError::Query { type_id, .. }
            | LoadError::Record { type_id, .. }
            | LoadError::MetadataNotFound(type_id)
            | LoadError::SnapshotMissing(type_id) => Some(type_id),
            _ => None,
        }
    }
}

pub type LoadResult<T> = Result<T, LoadError>;
