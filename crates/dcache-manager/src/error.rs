use dcache_types::TypeId;
use thiserror::Error;

/// Failures reported by a cache engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("search for cached keys of {type_id} failed: {reason}")]
    Search { type_id: TypeId, reason: String },

    #[error("failed to store {key}: {reason}")]
    Insert { key: String, reason: String },

    #[error("failed to remove {key}: {reason}")]
    Remove { key: String, reason: String },

    #[error("load error: {0}")]
    Load(#[from] dcache_loader::LoadError),
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Structural failures of the lifecycle manager.
#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("cache is already configured")]
    AlreadyConfigured,

    #[error("cache is not configured")]
    NotConfigured,

    #[error("reload worker panicked: {0}")]
    ReloadPanicked(String),

    #[error("invalid config file: {0}")]
    InvalidConfig(String),

    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ManagerResult<T> = Result<T, ManagerError>;

/// A per-type failure recorded in a reload result.
#[derive(Debug, Error)]
pub enum ReloadError {
    #[error("no metadata for {0}")]
    MetadataNotFound(TypeId),

    #[error("cached keys of {type_id} could not be enumerated: {source}")]
    Search {
        type_id: TypeId,
        #[source]
        source: EngineError,
    },

    #[error("fresh load of {type_id} failed: {reason}")]
    Load { type_id: TypeId, reason: String },

    #[error("could not store {key}: {source}")]
    Store {
        type_id: TypeId,
        key: String,
        #[source]
        source: EngineError,
    },

    #[error("could not delete stale key {key}: {source}")]
    Delete {
        type_id: TypeId,
        key: String,
        #[source]
        source: EngineError,
    },
}

impl ReloadError {
    pub fn type_id(&self) -> &TypeId {
        match self {
            Self::MetadataNotFound(type_id) => type_id,
            Self::Search { type_id, .. }
            | Self::Load { type_id, .. }
            | Self::Store { type_id, .. }
            | Self::Delete { type_id, .. } => type_id,
        }
    }
}
