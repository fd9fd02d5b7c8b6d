use async_trait::async_trait;
use dcache_types::BuildExecutionResult;
use uuid::Uuid;

use crate::error::WatchResult;

/// Remote service reporting the status of cache build executions.
#[async_trait]
pub trait BuildStatusClient: Send + Sync {
    /// Current status of `build`. A transport failure is an `Err`; an unknown
    /// build is an `Ok` result in the `NoExists` state.
    async fn execution_status(&self, build: Uuid) -> WatchResult<BuildExecutionResult>;
}
