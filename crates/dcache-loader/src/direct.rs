use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use dcache_types::{TypeId, TypeSchema};
use tracing::{info, warn};

use crate::cursor::{StreamingLoadCursor, TypeLoadError};
use crate::error::LoadResult;
use crate::loader::{
    fill_batch, parse_type_list, position_of, CacheLoader, LoadBatch, LoadPosition, LoaderContext,
    Phase, TYPES_PARAM,
};
use crate::query::SourceContext;
use crate::source::QueryRecordSource;

type ProcessingErrorHandler = Box<dyn Fn(&TypeLoadError) + Send>;

/// Loads the cache by querying the live source for every record of every
/// type.
///
/// A full loader unregisters each type that failed during a pass, so the next
/// full load does not retry it until it is registered again.
pub struct DirectLoader {
    source: Arc<dyn SourceContext>,
    ctx: LoaderContext,
    explicit: Option<Vec<TypeId>>,
    unregister_failed: bool,
    error_types: BTreeSet<TypeId>,
    on_processing_error: Option<ProcessingErrorHandler>,
    phase: Phase<QueryRecordSource>,
    errors: Vec<TypeLoadError>,
}

impl DirectLoader {
    /// Loader over every registered type that has metadata.
    pub fn new(source: Arc<dyn SourceContext>, ctx: LoaderContext) -> Self {
        Self {
            source,
            ctx,
            explicit: None,
            unregister_failed: true,
            error_types: BTreeSet::new(),
            on_processing_error: None,
            phase: Phase::Idle,
            errors: Vec::new(),
        }
    }

    /// Loader bound to `types`. Failed types stay registered.
    pub fn for_types(source: Arc<dyn SourceContext>, ctx: LoaderContext, types: Vec<TypeId>) -> Self {
        let mut loader = Self::new(source, ctx);
        loader.explicit = Some(types);
        loader.unregister_failed = false;
        loader
    }

    /// Callback raised once per type failure.
    pub fn on_processing_error(mut self, handler: impl Fn(&TypeLoadError) + Send + 'static) -> Self {
        self.on_processing_error = Some(Box::new(handler));
        self
    }

    /// Types that failed during the most recent pass, sorted.
    pub fn error_types(&self) -> &BTreeSet<TypeId> {
        &self.error_types
    }

    fn resolve_schemas(&mut self) -> Vec<Arc<TypeSchema>> {
        if let Some(types) = &self.explicit {
            return self.ctx.schemas_for(types, &mut self.errors);
        }
        let registered = self.ctx.registry.snapshot();
        let mut schemas: Vec<_> = self
            .ctx
            .catalog
            .iter()
            .filter(|s| registered.binary_search(&s.type_id).is_ok())
            .cloned()
            .collect();
        schemas.sort_by(|a, b| a.type_id.cmp(&b.type_id));
        schemas
    }

    fn start(&mut self) -> StreamingLoadCursor<QueryRecordSource> {
        self.errors.clear();
        self.error_types.clear();
        self.ctx.notify_started();
        let schemas = self.resolve_schemas();
        StreamingLoadCursor::new(
            schemas,
            QueryRecordSource::new(Arc::clone(&self.source)),
            Arc::clone(&self.ctx.key_factory),
            Arc::clone(&self.ctx.observers),
        )
    }

    fn finish(&mut self, mut cursor: StreamingLoadCursor<QueryRecordSource>) {
        self.errors.extend(cursor.take_errors());
        let loaded = cursor.index().yielded_since_start;
        cursor.dispose();

        for error in &self.errors {
            self.error_types.insert(error.type_id.clone());
            if let Some(handler) = &self.on_processing_error {
                handler(error);
            }
        }
        if self.unregister_failed {
            for type_id in &self.error_types {
                if self.ctx.registry.unregister(type_id) {
                    warn!(type_id = %type_id, "type unregistered after failed load");
                }
            }
        }
        info!(
            loaded,
            failed = self.error_types.len(),
            "direct load finished"
        );
        self.ctx.notify_finished();
    }
}

impl CacheLoader for DirectLoader {
    fn init(&mut self, params: &BTreeMap<String, String>) -> LoadResult<()> {
        if let Some(types) = params.get(TYPES_PARAM) {
            self.explicit
                .get_or_insert_with(Vec::new)
                .extend(parse_type_list(types));
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
        if let Phase::Loading(mut cursor) = std::mem::replace(&mut self.phase, Phase::Idle) {
            cursor.dispose();
        }
    }

    fn load_errors(&self) -> &[TypeLoadError] {
        &self.errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use dcache_events::LoaderObservers;
    use dcache_types::{
        FieldDescriptor, FieldKind, FieldValue, PropertySchema, RecordDescriptor, SchemaCatalog,
        SchemaKeyFactory, TypeRegistry,
    };

    use crate::error::LoadError;
    use crate::query::InMemorySourceContext;

    fn schema(name: &str) -> TypeSchema {
        TypeSchema::new(TypeId::new(name)).with_property(PropertySchema::key("id", FieldKind::Int))
    }

    fn source(tables: &[(&str, i64)]) -> Arc<InMemorySourceContext> {
        let desc = Arc::new(
            RecordDescriptor::new(vec![FieldDescriptor::new("id", FieldKind::Int)]).unwrap(),
        );
        let ctx = InMemorySourceContext::new();
        for (name, rows) in tables {
            ctx.set_table(
                TypeId::new(*name),
                Arc::clone(&desc),
                (0..*rows).map(|i| vec![FieldValue::Int(i)]).collect(),
            );
        }
        Arc::new(ctx)
    }

    fn context(registered: &[&str], catalog: &[&str]) -> LoaderContext {
        let registry = TypeRegistry::new();
        for name in registered {
            registry.register(TypeId::new(*name));
        }
        let mut schemas = SchemaCatalog::new();
        for name in catalog {
            schemas.insert(schema(name));
        }
        LoaderContext {
            registry: Arc::new(registry),
            catalog: Arc::new(schemas),
            key_factory: Arc::new(SchemaKeyFactory),
            observers: Arc::new(LoaderObservers::new()),
        }
    }

    fn drain(loader: &mut DirectLoader, capacity: usize) -> (Vec<String>, usize) {
        let mut keys = Vec::new();
        let mut calls = 0;
        let mut batch = LoadBatch::new(capacity);
        let mut position = None;
        while loader.load_next(&mut batch, &mut position).unwrap() {
            calls += 1;
            keys.extend(batch.drain().map(|e| e.key.to_string()));
        }
        (keys, calls)
    }

    #[test]
    fn loads_registered_types_with_metadata_in_name_order() {
        let ctx = context(&["b.B", "a.A", "c.NoMeta"], &["a.A", "b.B", "d.Unregistered"]);
        let mut loader = DirectLoader::new(source(&[("a.A", 2), ("b.B", 1)]), ctx);
        let (keys, calls) = drain(&mut loader, 2);
        assert_eq!(keys, ["a.A[0]", "a.A[1]", "b.B[0]"]);
        assert_eq!(calls, 2);
        assert!(loader.error_types().is_empty());
    }

    #[test]
    fn failed_types_are_unregistered_on_full_load() {
        let ctx = context(&["a.A", "b.B"], &["a.A", "b.B"]);
        let registry = Arc::clone(&ctx.registry);
        let src = source(&[("a.A", 1), ("b.B", 1)]);
        src.fail_queries(&TypeId::new("a.A"), true);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let mut loader = DirectLoader::new(src, ctx)
            .on_processing_error(move |e| sink.lock().unwrap().push(e.type_id.to_string()));

        let (keys, _) = drain(&mut loader, 10);
        assert_eq!(keys, ["b.B[0]"]);
        assert_eq!(*seen.lock().unwrap(), ["a.A"]);
        assert!(!registry.contains(&TypeId::new("a.A")));
        assert!(registry.contains(&TypeId::new("b.B")));

        let (keys, _) = drain(&mut loader, 10);
        assert_eq!(keys, ["b.B[0]"]);
        assert!(loader.error_types().is_empty());
    }

    #[test]
    fn bound_loader_keeps_failed_types_registered() {
        let ctx = context(&["a.A"], &["a.A"]);
        let registry = Arc::clone(&ctx.registry);
        let src = source(&[]);
        let mut loader = DirectLoader::for_types(src, ctx, vec![TypeId::new("a.A"), TypeId::new("z.Z")]);

        let (keys, _) = drain(&mut loader, 10);
        assert!(keys.is_empty());
        assert_eq!(loader.error_types().len(), 2);
        assert!(registry.contains(&TypeId::new("a.A")));
        assert!(loader
            .load_errors()
            .iter()
            .any(|e| matches!(e.error, LoadError::MetadataNotFound(_))));
    }

    #[test]
    fn init_binds_type_list() {
        let ctx = context(&["a.A", "b.B"], &["a.A", "b.B"]);
        let mut loader = DirectLoader::new(source(&[("a.A", 1), ("b.B", 1)]), ctx);
        let params = BTreeMap::from([(TYPES_PARAM.to_string(), "b.B".to_string())]);
        loader.init(&params).unwrap();
        assert_eq!(drain(&mut loader, 10).0, ["b.B[0]"]);
    }

    #[test]
    fn dispose_mid_load_restarts_from_scratch() {
        let ctx = context(&["a.A"], &["a.A"]);
        let mut loader = DirectLoader::new(source(&[("a.A", 3)]), ctx);
        let mut batch = LoadBatch::new(1);
        let mut position = None;
        assert!(loader.load_next(&mut batch, &mut position).unwrap());
        assert_eq!(position.map(|p| p.records_loaded), Some(1));
        loader.dispose();
        assert_eq!(drain(&mut loader, 10).0.len(), 3);
    }
}
