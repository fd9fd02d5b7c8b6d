use thiserror::Error;

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("build status request failed: {0}")]
    Transport(String),

    #[error("no tokio runtime available to run the watcher")]
    NoRuntime,

    #[error("watcher worker failed: {0}")]
    Worker(String),
}

pub type WatchResult<T> = Result<T, WatchError>;
