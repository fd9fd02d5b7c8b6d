use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Polling configuration for the remote build watcher.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Delay between two status checks.
    pub poll_interval: Duration,
    /// Pause after a lease expires before the next tick.
    pub expiry_backoff: Duration,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            expiry_backoff: Duration::from_millis(500),
        }
    }
}
