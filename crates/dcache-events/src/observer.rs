use dcache_types::TypeId;
use uuid::Uuid;

use crate::error::ObserverError;

/// Outcome delivered with [`BuildMonitorObserver::on_completed`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BuildCompletion {
    pub success: bool,
    /// The watch ended by lease expiry or abort rather than a remote outcome.
    pub cancelled: bool,
    pub error: Option<String>,
}

impl BuildCompletion {
    pub fn succeeded() -> Self {
        Self {
            success: true,
            cancelled: false,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            cancelled: false,
            error: Some(error.into()),
        }
    }

    pub fn cancelled() -> Self {
        Self {
            success: false,
            cancelled: true,
            error: None,
        }
    }
}

/// Receives cache load lifecycle events. Every method defaults to a no-op.
pub trait CacheLoaderObserver: Send + Sync {
    fn on_load_started(&self) -> Result<(), ObserverError> {
        Ok(())
    }

    fn on_load_finished(&self) -> Result<(), ObserverError> {
        Ok(())
    }

    /// Current-stage progress as `current` out of `total` percent.
    fn on_progress(&self, _total: u32, _current: u32) -> Result<(), ObserverError> {
        Ok(())
    }

    fn on_load_error(&self, _type_id: &TypeId, _message: &str) -> Result<(), ObserverError> {
        Ok(())
    }

    fn on_download_progress(&self, _percent: u32) -> Result<(), ObserverError> {
        Ok(())
    }

    /// Optional per-type capability. Observers returning `None` are skipped
    /// for begin/end type events.
    fn type_load_observer(&self) -> Option<&dyn TypeLoadObserver> {
        None
    }
}

/// Optional capability: begin/end of loading one entity type.
pub trait TypeLoadObserver: Send + Sync {
    fn on_begin_type(&self, type_id: &TypeId) -> Result<(), ObserverError>;
    fn on_end_type(&self, type_id: &TypeId) -> Result<(), ObserverError>;
}

/// Receives remote build status events.
pub trait BuildMonitorObserver: Send + Sync {
    fn on_start(&self, _build: Uuid) -> Result<(), ObserverError> {
        Ok(())
    }

    fn on_message_changed(&self, _build: Uuid, _message: &str) -> Result<(), ObserverError> {
        Ok(())
    }

    fn on_progress_changed(&self, _build: Uuid, _total: u32, _current: u32) -> Result<(), ObserverError> {
        Ok(())
    }

    fn on_completed(&self, _build: Uuid, _completion: &BuildCompletion) -> Result<(), ObserverError> {
        Ok(())
    }

    fn on_check_error(&self, _build: Uuid, _error: &str) -> Result<(), ObserverError> {
        Ok(())
    }
}
