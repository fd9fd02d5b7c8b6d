use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::thread::{self, JoinHandle};

use dcache_events::{BuildObservers, LoaderObservers};
use dcache_loader::LoaderContext;
use dcache_types::{RecordKey, RecordKeyFactory, SchemaCatalog, TypeId, TypeRegistry, TypeSchema};
use dcache_watch::{BuildStatusClient, RemoteBuildWatcher};
use tracing::{debug, info, warn};

use crate::config::{CacheConfig, StaleKeyPolicy};
use crate::engine::{pump, CacheEngine, CacheEngineFactory, EngineConfig};
use crate::error::{ManagerError, ManagerResult, ReloadError};
use crate::factory::{LoaderFactory, LoaderKind};
use crate::index::index_descriptors;
use crate::notify::ChangeNotifier;

/// Outcome of [`CacheLifecycleManager::reload`].
///
/// `success` is `true` exactly when no per-type error was recorded.
#[derive(Debug, Default)]
pub struct ReloadResult {
    pub success: bool,
    pub errors: Vec<ReloadError>,
    pub inserted: Vec<RecordKey>,
    pub updated: Vec<RecordKey>,
    pub deleted: Vec<RecordKey>,
}

/// A reload started by [`CacheLifecycleManager::begin_reload`].
pub enum ReloadHandle {
    Pending(JoinHandle<ManagerResult<ReloadResult>>),
    /// The worker could not be spawned and the reload ran on the caller.
    Completed(ManagerResult<ReloadResult>),
}

struct Configured {
    engine: Arc<dyn CacheEngine>,
    kind: LoaderKind,
}

/// Owns the registry of managed types and the cache engine, and keeps the
/// cache in step with its source.
///
/// The engine is built once, by either [`configure_local_cache`] or
/// [`configure_server_cache`]. [`reload`] then brings selected types back in
/// line with freshly loaded data without ever clearing them.
///
/// [`configure_local_cache`]: Self::configure_local_cache
/// [`configure_server_cache`]: Self::configure_server_cache
/// [`reload`]: Self::reload
pub struct CacheLifecycleManager {
    registry: Arc<TypeRegistry>,
    catalog: Arc<SchemaCatalog>,
    key_factory: Arc<dyn RecordKeyFactory>,
    loader_observers: Arc<LoaderObservers>,
    build_observers: Arc<BuildObservers>,
    loaders: LoaderFactory,
    engine_factory: Arc<dyn CacheEngineFactory>,
    notifier: Option<Arc<dyn ChangeNotifier>>,
    config: CacheConfig,
    configured: RwLock<Option<Configured>>,
    initialized: AtomicBool,
}

impl CacheLifecycleManager {
    pub fn new(
        catalog: Arc<SchemaCatalog>,
        key_factory: Arc<dyn RecordKeyFactory>,
        engine_factory: Arc<dyn CacheEngineFactory>,
        loaders: LoaderFactory,
        config: CacheConfig,
    ) -> Self {
        Self {
            registry: Arc::new(TypeRegistry::new()),
            catalog,
            key_factory,
            loader_observers: Arc::new(LoaderObservers::new()),
            build_observers: Arc::new(BuildObservers::new()),
            loaders,
            engine_factory,
            notifier: None,
            config,
            configured: RwLock::new(None),
            initialized: AtomicBool::new(false),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn ChangeNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Add `type_id` to the managed types. Registering twice is a no-op.
    pub fn register(&self, type_id: TypeId) -> &Self {
        if self.registry.register(type_id.clone()) {
            debug!(type_id = %type_id, "type registered");
        }
        self
    }

    pub fn unregister(&self, type_id: &TypeId) -> &Self {
        if self.registry.unregister(type_id) {
            debug!(type_id = %type_id, "type unregistered");
        }
        self
    }

    pub fn is_registered(&self, type_id: &TypeId) -> bool {
        self.registry.contains(type_id)
    }

    /// Managed types sorted by qualified name.
    pub fn registered_types(&self) -> Vec<TypeId> {
        self.registry.snapshot()
    }

    pub fn loader_observers(&self) -> &Arc<LoaderObservers> {
        &self.loader_observers
    }

    pub fn build_observers(&self) -> &Arc<BuildObservers> {
        &self.build_observers
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Build the engine around a [`BootstrapLoader`](dcache_loader::BootstrapLoader).
    pub fn configure_local_cache(&self) -> ManagerResult<()> {
        self.configure(LoaderKind::Bootstrap)
    }

    /// Build the engine around a [`DirectLoader`](dcache_loader::DirectLoader).
    pub fn configure_server_cache(&self) -> ManagerResult<()> {
        self.configure(LoaderKind::Direct)
    }

    fn configure(&self, kind: LoaderKind) -> ManagerResult<()> {
        let mut configured = self.configured.write().expect("manager lock poisoned");
        if configured.is_some() {
            return Err(ManagerError::AlreadyConfigured);
        }
        let loader = self.loaders.full(kind, self.loader_context())?;
        let indexes = index_descriptors(&self.catalog);
        let index_count = indexes.len();
        let engine = self.engine_factory.create(EngineConfig {
            loader,
            indexes,
            batch_size: self.config.batch_size,
        })?;
        *configured = Some(Configured { engine, kind });
        info!(?kind, indexes = index_count, "cache configured");
        Ok(())
    }

    pub fn is_configured(&self) -> bool {
        self.configured.read().expect("manager lock poisoned").is_some()
    }

    /// `true` once the initial load has completed.
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    pub fn engine(&self) -> Option<Arc<dyn CacheEngine>> {
        self.configured
            .read()
            .expect("manager lock poisoned")
            .as_ref()
            .map(|c| Arc::clone(&c.engine))
    }

    /// Populate the cache through the configured loader.
    pub fn load(&self) -> ManagerResult<u64> {
        let (engine, _) = self.active()?;
        let stored = engine.load()?;
        self.initialized.store(true, Ordering::SeqCst);
        info!(stored, "initial cache load complete");
        Ok(stored)
    }

    /// Watcher that publishes remote build progress to this manager's build
    /// observers.
    pub fn build_watcher(&self, client: Arc<dyn BuildStatusClient>) -> RemoteBuildWatcher {
        RemoteBuildWatcher::new(
            client,
            Arc::clone(&self.build_observers),
            self.config.watch.clone(),
        )
    }

    fn active(&self) -> ManagerResult<(Arc<dyn CacheEngine>, LoaderKind)> {
        self.configured
            .read()
            .expect("manager lock poisoned")
            .as_ref()
            .map(|c| (Arc::clone(&c.engine), c.kind))
            .ok_or(ManagerError::NotConfigured)
    }

    fn loader_context(&self) -> LoaderContext {
        LoaderContext {
            registry: Arc::clone(&self.registry),
            catalog: Arc::clone(&self.catalog),
            key_factory: Arc::clone(&self.key_factory),
            observers: Arc::clone(&self.loader_observers),
        }
    }

    /// Bring the cached entries of `types` in line with freshly loaded data.
    ///
    /// Types are processed in order. For each type the currently cached keys
    /// are enumerated, a loader bound to that type alone stores every fresh
    /// record over its previous version, and only then are the keys the fresh
    /// load did not produce deleted. Per-type failures are recorded in the
    /// result and never abort other types. A type whose cached keys cannot be
    /// enumerated, or whose fresh load failed, keeps its cached entries.
    ///
    /// Fails only when the cache is not configured or no loader can be built.
    pub fn reload(&self, types: &[TypeId]) -> ManagerResult<ReloadResult> {
        let (engine, kind) = self.active()?;
        let mut result = ReloadResult::default();

        let mut schemas = Vec::with_capacity(types.len());
        for type_id in types {
            match self.catalog.get(type_id) {
                Some(schema) => schemas.push(schema),
                None => {
                    warn!(type_id = %type_id, "no metadata for reloaded type");
                    result.errors.push(ReloadError::MetadataNotFound(type_id.clone()));
                }
            }
        }

        for schema in &schemas {
            self.reload_type(engine.as_ref(), kind, schema, &mut result)?;
        }

        result.success = result.errors.is_empty();
        info!(
            types = types.len(),
            inserted = result.inserted.len(),
            updated = result.updated.len(),
            deleted = result.deleted.len(),
            errors = result.errors.len(),
            "reload finished"
        );
        Ok(result)
    }

    fn reload_type(
        &self,
        engine: &dyn CacheEngine,
        kind: LoaderKind,
        schema: &TypeSchema,
        result: &mut ReloadResult,
    ) -> ManagerResult<()> {
        let type_id = &schema.type_id;
        let cached = match engine.search_keys(type_id) {
            Ok(keys) => keys,
            Err(source) => {
                warn!(type_id = %type_id, error = %source, "cached keys unavailable, type left untouched");
                result.errors.push(ReloadError::Search {
                    type_id: type_id.clone(),
                    source,
                });
                return Ok(());
            }
        };
        let mut stale: BTreeMap<String, RecordKey> =
            cached.into_iter().map(|k| (k.to_string(), k)).collect();
        // Each key is reported once per reload; later copies only overwrite.
        let mut seen = BTreeSet::new();

        let mut loader =
            self.loaders
                .for_types(kind, self.loader_context(), vec![type_id.clone()])?;
        let notifier = self.notifier.as_deref();
        let pumped = pump(&mut *loader, self.config.batch_size, |entries| {
            let mut inserted = Vec::new();
            for entry in entries {
                let key = entry.key.clone();
                let text = key.to_string();
                let first = seen.insert(text.clone());
                let existed = stale.remove(&text).is_some();
                if let Err(source) = engine.upsert(entry) {
                    result.errors.push(ReloadError::Store {
                        type_id: type_id.clone(),
                        key: text,
                        source,
                    });
                    continue;
                }
                if !first {
                    debug!(type_id = %type_id, key = %text, "duplicate record in fresh load");
                    continue;
                }
                if existed {
                    if let Some(n) = notifier.filter(|n| n.is_watched(&key)) {
                        n.notify_changed(&key);
                    }
                    result.updated.push(key);
                } else {
                    inserted.push(key);
                }
            }
            if !inserted.is_empty() {
                if let Some(n) = notifier {
                    n.records_inserted(type_id, &inserted);
                }
                result.inserted.extend(inserted);
            }
        });

        let mut load_failed = false;
        if let Err(e) = pumped {
            load_failed = true;
            result.errors.push(ReloadError::Load {
                type_id: type_id.clone(),
                reason: e.to_string(),
            });
        }
        for failure in loader.load_errors() {
            load_failed = true;
            result.errors.push(ReloadError::Load {
                type_id: failure.type_id.clone(),
                reason: failure.error.to_string(),
            });
        }
        loader.dispose();

        if load_failed {
            warn!(type_id = %type_id, stale = stale.len(), "fresh load failed, stale keys kept");
            return Ok(());
        }

        for (text, key) in stale {
            match engine.remove(&key) {
                Ok(_) => {
                    if let Some(n) = notifier {
                        n.records_deleted(type_id, std::slice::from_ref(&key));
                    }
                    result.deleted.push(key);
                }
                Err(source) => {
                    warn!(type_id = %type_id, key = %text, error = %source, "stale key not deleted");
                    result.errors.push(ReloadError::Delete {
                        type_id: type_id.clone(),
                        key: text,
                        source,
                    });
                    if self.config.stale_key_policy == StaleKeyPolicy::AbortType {
                        break;
                    }
                }
            }
        }
        Ok(())
    }

    /// Start [`reload`](Self::reload) on a worker thread. Runs it on the
    /// calling thread if the worker cannot be spawned, so callers must not
    /// rely on it returning before the reload is done.
    pub fn begin_reload(self: &Arc<Self>, types: Vec<TypeId>) -> ReloadHandle {
        let manager = Arc::clone(self);
        let worker_types = types.clone();
        let spawned = thread::Builder::new()
            .name("dcache-reload".into())
            .spawn(move || manager.reload(&worker_types));
        match spawned {
            Ok(handle) => ReloadHandle::Pending(handle),
            Err(e) => {
                warn!(error = %e, "reload worker unavailable, reloading synchronously");
                ReloadHandle::Completed(self.reload(&types))
            }
        }
    }

    /// Wait for a reload started with [`begin_reload`](Self::begin_reload).
    /// A panic on the worker is returned as [`ManagerError::ReloadPanicked`].
    pub fn end_reload(handle: ReloadHandle) -> ManagerResult<ReloadResult> {
        match handle {
            ReloadHandle::Completed(result) => result,
            ReloadHandle::Pending(handle) => handle.join().unwrap_or_else(|payload| {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                Err(ManagerError::ReloadPanicked(message))
            }),
        }
    }
}
