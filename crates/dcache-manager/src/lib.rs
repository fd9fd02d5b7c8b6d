//! Cache lifecycle management for dcache.
//!
//! [`CacheLifecycleManager`] owns the set of managed entity types, builds the
//! cache engine around a bootstrap or direct loader, runs the initial load,
//! and reconciles selected types with fresh data on [`reload`].
//!
//! The cache engine itself is a collaborator behind [`CacheEngine`];
//! [`InMemoryCacheEngine`] is a process-local implementation. Changes applied
//! by a reload are reported to a [`ChangeNotifier`].
//!
//! [`reload`]: CacheLifecycleManager::reload

pub mod config;
pub mod engine;
pub mod error;
pub mod factory;
pub mod index;
pub mod manager;
pub mod notify;

pub use config::{CacheConfig, StaleKeyPolicy};
pub use engine::{
    pump, CacheEngine, CacheEngineFactory, EngineConfig, InMemoryCacheEngine, InMemoryEngineFactory,
};
pub use error::{EngineError, EngineResult, ManagerError, ManagerResult, ReloadError};
pub use factory::{LoaderFactory, LoaderKind};
pub use index::{index_descriptors, IndexDescriptor};
pub use manager::{CacheLifecycleManager, ReloadHandle, ReloadResult};
pub use notify::{ChangeEvent, ChangeNotifier, RecordingNotifier};
