use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use dcache_pack::SnapshotArchive;
use dcache_store::LocalSnapshotStore;
use dcache_types::{TypeId, VersionStamp};
use tracing::{debug, info, warn};

use crate::cursor::{StreamingLoadCursor, TypeLoadError};
use crate::download::{download_channel, SnapshotDownloader};
use crate::error::LoadResult;
use crate::loader::{
    fill_batch, parse_type_list, position_of, CacheLoader, LoadBatch, LoadPosition, LoaderContext,
    Phase, TYPES_PARAM,
};
use crate::source::SnapshotRecordSource;

/// Loads the cache from the local snapshot store after fetching the deltas
/// the store is missing.
///
/// The first [`load_next`](CacheLoader::load_next) of a pass queues one
/// download request per type carrying its local version, blocks until the
/// combined download completes, ingests the received snapshots and then
/// streams every type from the store.
pub struct BootstrapLoader {
    store: Arc<LocalSnapshotStore>,
    downloader: Arc<dyn SnapshotDownloader>,
    ctx: LoaderContext,
    explicit: Vec<TypeId>,
    include_registered: bool,
    phase: Phase<SnapshotRecordSource>,
    errors: Vec<TypeLoadError>,
}

impl BootstrapLoader {
    /// Loader over every registered type.
    pub fn new(
        store: Arc<LocalSnapshotStore>,
        downloader: Arc<dyn SnapshotDownloader>,
        ctx: LoaderContext,
    ) -> Self {
        Self {
            store,
            downloader,
            ctx,
            explicit: Vec::new(),
            include_registered: true,
            phase: Phase::Idle,
            errors: Vec::new(),
        }
    }

    /// Loader bound to `types` only, ignoring the registry.
    pub fn for_types(
        store: Arc<LocalSnapshotStore>,
        downloader: Arc<dyn SnapshotDownloader>,
        ctx: LoaderContext,
        types: Vec<TypeId>,
    ) -> Self {
        let mut loader = Self::new(store, downloader, ctx);
        loader.explicit = types;
        loader.include_registered = false;
        loader
    }

    /// Load `type_id` in addition to the registered types.
    pub fn add_type(&mut self, type_id: TypeId) -> &mut Self {
        self.explicit.push(type_id);
        self
    }

    /// Explicit types plus, unless bound to a fixed list, the registry,
    /// deduplicated and sorted by qualified name.
    fn resolve_types(&self) -> Vec<TypeId> {
        let mut types: BTreeSet<TypeId> = self.explicit.iter().cloned().collect();
        if self.include_registered {
            types.extend(self.ctx.registry.snapshot());
        }
        types.into_iter().collect()
    }

    fn start(&mut self) -> StreamingLoadCursor<SnapshotRecordSource> {
        self.errors.clear();
        self.downloader.clear();

        let types = self.resolve_types();
        for type_id in &types {
            let request = self
                .store
                .version_of(type_id)
                .unwrap_or_else(|| VersionStamp::unversioned(type_id.clone()));
            self.downloader.add(request);
        }
        self.ctx.notify_started();

        let (sink, gate) = download_channel(Arc::clone(&self.ctx.observers));
        if let Err(e) = self.downloader.run_async(sink) {
            warn!(error = %e, "download could not be started");
        }
        let outcome = gate.wait();
        match (outcome.package, outcome.error) {
            (_, Some(error)) => warn!(error = %error, "snapshot download failed, loading local data"),
            (None, None) if outcome.cancelled => debug!("snapshot download cancelled"),
            (Some(package), None) => self.ingest(package),
            (None, None) => debug!("snapshot download returned no package"),
        }

        let schemas = self.ctx.schemas_for(&types, &mut self.errors);
        StreamingLoadCursor::new(
            schemas,
            SnapshotRecordSource::new(Arc::clone(&self.store)),
            Arc::clone(&self.ctx.key_factory),
            Arc::clone(&self.ctx.observers),
        )
    }

    /// Publish every snapshot in `package`. A rejected entry is skipped; a
    /// corrupt section ends the enumeration.
    fn ingest(&self, package: SnapshotArchive) {
        let mut published = 0usize;
        let mut rejected = 0usize;
        let mut entries = package.entries();
        while let Some(section) = entries.next_section() {
            let mut section = match section {
                Ok(section) => section,
                Err(e) => {
                    warn!(error = %e, "snapshot archive corrupt, stopping ingestion");
                    break;
                }
            };
            let stamp = section.stamp.clone();
            if self.store.insert_stream(&stamp, &mut section) {
                published += 1;
            } else {
                rejected += 1;
                warn!(type_id = %stamp.type_id, "downloaded snapshot not stored");
            }
        }
        info!(published, rejected, "snapshot download ingested");
    }

    fn finish(&mut self, mut cursor: StreamingLoadCursor<SnapshotRecordSource>) {
        self.errors.extend(cursor.take_errors());
        cursor.dispose();
        self.ctx.notify_finished();
    }
}

impl CacheLoader for BootstrapLoader {
    fn init(&mut self, params: &BTreeMap<String, String>) -> LoadResult<()> {
        if let Some(types) = params.get(TYPES_PARAM) {
            self.explicit.extend(parse_type_list(types));
        }
        Ok(())
    }

    fn load_next(
        &mut self,
        batch: &mut LoadBatch,
        position: &mut Option<LoadPosition>,
    ) -> LoadResult<bool> {
        let mut cursor = match std::mem::replace(&mut self.phase, Phase::Idle) {
            Phase::Loading(cursor) => cursor,
            Phase::Drained => {
                *position = None;
                return Ok(false);
            }
            Phase::Idle => self.start(),
        };

        let before = batch.len();
        let exhausted = fill_batch(&mut cursor, batch);
        *position = Some(position_of(&cursor));
        if !exhausted {
            self.phase = Phase::Loading(cursor);
            return Ok(true);
        }

        self.finish(cursor);
        if batch.len() > before {
            self.phase = Phase::Drained;
            Ok(true)
        } else {
            *position = None;
            Ok(false)
        }
    }

    fn dispose(&mut self) {
        self.downloader.cancel_async();
        if let Phase::Loading(mut cursor) = std::mem::replace(&mut self.phase, Phase::Idle) {
            cursor.dispose();
        }
    }

    fn load_errors(&self) -> &[TypeLoadError] {
        &self.errors
    }
}
