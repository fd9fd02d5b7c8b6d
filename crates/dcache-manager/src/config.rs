use std::path::{Path, PathBuf};

use dcache_watch::WatchConfig;
use serde::{Deserialize, Serialize};

use crate::error::{ManagerError, ManagerResult};

/// What a reload does when deleting one stale key fails.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StaleKeyPolicy {
    /// Record the failure and keep deleting the type's other stale keys.
    #[default]
    Continue,
    /// Record the failure and leave the type's remaining stale keys cached.
    AbortType,
}

/// Configuration of a cache lifecycle manager.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Directory of the local snapshot store.
    pub store_dir: PathBuf,
    /// Entries requested per loader call.
    pub batch_size: usize,
    pub stale_key_policy: StaleKeyPolicy,
    pub watch: WatchConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            store_dir: PathBuf::from("dcache-snapshots"),
            batch_size: 256,
            stale_key_policy: StaleKeyPolicy::Continue,
            watch: WatchConfig::default(),
        }
    }
}

impl CacheConfig {
    pub fn from_toml_str(text: &str) -> ManagerResult<Self> {
        toml::from_str(text).map_err(|e| ManagerError::InvalidConfig(e.to_string()))
    }

    /// Read a TOML config file.
    pub fn load(path: impl AsRef<Path>) -> ManagerResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }
}
