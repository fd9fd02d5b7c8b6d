/// Failure reported by a single observer.
#[derive(Debug, thiserror::Error)]
pub enum ObserverError {
    /// The observer returned an error.
    #[error("observer failed: {0}")]
    Failed(String),

    /// The observer panicked while handling an event.
    #[error("observer panicked: {0}")]
    Panicked(String),

    /// A nested hub reported failures of its own observers.
    #[error(transparent)]
    Fanout(#[from] FanoutError),
}

/// One failed delivery within a fan-out.
#[derive(Debug)]
pub struct ObserverFailure {
    /// Position of the observer in the hub at notification time.
    pub index: usize,
    pub error: ObserverError,
}

/// Aggregate of every observer failure for one event. All observers were
/// notified regardless.
#[derive(Debug, thiserror::Error)]
#[error("{} observer(s) failed handling {event}", failures.len())]
pub struct FanoutError {
    pub event: &'static str,
    pub failures: Vec<ObserverFailure>,
}

/// Convenience alias used throughout the events crate.
pub type Result<T> = std::result::Result<T, FanoutError>;
