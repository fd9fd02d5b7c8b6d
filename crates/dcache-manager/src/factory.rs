use std::sync::Arc;

use dcache_loader::{
    BootstrapLoader, CacheLoader, DirectLoader, LoaderContext, SnapshotDownloader, SourceContext,
};
use dcache_store::LocalSnapshotStore;
use dcache_types::TypeId;
use serde::{Deserialize, Serialize};

use crate::error::{ManagerError, ManagerResult};

/// Which loader populates the cache.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoaderKind {
    /// Local snapshots plus downloaded deltas.
    Bootstrap,
    /// Live queries against the source.
    Direct,
}

/// Builds loaders of either kind from the collaborators it was given.
#[derive(Clone, Default)]
pub struct LoaderFactory {
    snapshots: Option<(Arc<LocalSnapshotStore>, Arc<dyn SnapshotDownloader>)>,
    source: Option<Arc<dyn SourceContext>>,
}

impl LoaderFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable [`LoaderKind::Bootstrap`].
    pub fn with_snapshots(
        mut self,
        store: Arc<LocalSnapshotStore>,
        downloader: Arc<dyn SnapshotDownloader>,
    ) -> Self {
        self.snapshots = Some((store, downloader));
        self
    }

    /// Enable [`LoaderKind::Direct`].
    pub fn with_source(mut self, source: Arc<dyn SourceContext>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn supports(&self, kind: LoaderKind) -> bool {
        match kind {
            LoaderKind::Bootstrap => self.snapshots.is_some(),
            LoaderKind::Direct => self.source.is_some(),
        }
    }

    /// Loader over every registered type.
    pub fn full(&self, kind: LoaderKind, ctx: LoaderContext) -> ManagerResult<Box<dyn CacheLoader>> {
        match kind {
            LoaderKind::Bootstrap => {
                let (store, downloader) = self.snapshots()?;
                Ok(Box::new(BootstrapLoader::new(store, downloader, ctx)))
            }
            LoaderKind::Direct => Ok(Box::new(DirectLoader::new(self.source()?, ctx))),
        }
    }

    /// Loader bound to `types`, used by reloads.
    pub fn for_types(
        &self,
        kind: LoaderKind,
        ctx: LoaderContext,
        types: Vec<TypeId>,
    ) -> ManagerResult<Box<dyn CacheLoader>> {
        match kind {
            LoaderKind::Bootstrap => {
                let (store, downloader) = self.snapshots()?;
                Ok(Box::new(BootstrapLoader::for_types(store, downloader, ctx, types)))
            }
            LoaderKind::Direct => Ok(Box::new(DirectLoader::for_types(self.source()?, ctx, types))),
        }
    }

    fn snapshots(&self) -> ManagerResult<(Arc<LocalSnapshotStore>, Arc<dyn SnapshotDownloader>)> {
        self.snapshots.clone().ok_or_else(|| {
            ManagerError::Configuration("bootstrap loader needs a snapshot store and downloader".into())
        })
    }

    fn source(&self) -> ManagerResult<Arc<dyn SourceContext>> {
        self.source
            .clone()
            .ok_or_else(|| ManagerError::Configuration("direct loader needs a source context".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dcache_events::LoaderObservers;
    use dcache_loader::InMemorySourceContext;
    use dcache_types::{SchemaCatalog, SchemaKeyFactory, TypeRegistry};

    fn ctx() -> LoaderContext {
        LoaderContext {
            registry: Arc::new(TypeRegistry::new()),
            catalog: Arc::new(SchemaCatalog::new()),
            key_factory: Arc::new(SchemaKeyFactory),
            observers: Arc::new(LoaderObservers::new()),
        }
    }

    #[test]
    fn missing_collaborators_are_configuration_errors() {
        let factory = LoaderFactory::new();
        assert!(!factory.supports(LoaderKind::Bootstrap));
        assert!(matches!(
            factory.full(LoaderKind::Bootstrap, ctx()),
            Err(ManagerError::Configuration(_))
        ));
        assert!(matches!(
            factory.for_types(LoaderKind::Direct, ctx(), Vec::new()),
            Err(ManagerError::Configuration(_))
        ));
    }

    #[test]
    fn direct_loader_from_source() {
        let factory = LoaderFactory::new().with_source(Arc::new(InMemorySourceContext::new()));
        assert!(factory.supports(LoaderKind::Direct));
        assert!(factory.full(LoaderKind::Direct, ctx()).is_ok());
    }
}
