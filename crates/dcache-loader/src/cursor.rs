use std::fmt;
use std::sync::Arc;

use dcache_events::{CacheLoaderObserver, LoaderObservers, TypeLoadObserver};
use dcache_types::{EntryRecord, KeyGenerator, RecordKeyFactory, TypeId, TypeSchema};
use tracing::{debug, warn};

use crate::error::LoadError;
use crate::query::RecordStream;
use crate::source::{BindStrategy, RecordSource};

/// Position state of a [`StreamingLoadCursor`].
///
/// Reset only when the cursor is disposed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CacheLoaderIndex {
    /// Number of types opened so far.
    pub type_cursor: usize,
    /// Records yielded from the current type.
    pub record_cursor: u64,
    /// Records yielded since the cursor started.
    pub yielded_since_start: u64,
    pub bind_strategy: BindStrategy,
}

impl CacheLoaderIndex {
    fn new(bind_strategy: BindStrategy) -> Self {
        Self {
            type_cursor: 0,
            record_cursor: 0,
            yielded_since_start: 0,
            bind_strategy,
        }
    }
}

/// One record pulled from the cursor with the key generator of its type.
///
/// `key_generator` is `None` for types without a usable key; such items are
/// not an end-of-stream signal.
#[derive(Clone)]
pub struct LoadItem {
    pub record: EntryRecord,
    pub key_generator: Option<Arc<dyn KeyGenerator>>,
    pub type_id: TypeId,
}

impl fmt::Debug for LoadItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadItem")
            .field("type_id", &self.type_id)
            .field("record", &self.record)
            .field("has_key_generator", &self.key_generator.is_some())
            .finish()
    }
}

/// A per-type failure the cursor recovered from.
#[derive(Debug)]
pub struct TypeLoadError {
    pub type_id: TypeId,
    pub error: LoadError,
}

struct ActiveType {
    type_id: TypeId,
    key_generator: Option<Arc<dyn KeyGenerator>>,
    records: RecordStream,
}

/// Pull-driven cursor producing the records of a list of types, one type at
/// a time.
///
/// Progress is published before each type opens as `position * 100 / total`
/// and once more as 100 when the cursor is exhausted. A type that fails to
/// open, or whose record stream yields an error, is reported to the observers
/// and recorded, and the cursor moves on to the next type. After returning
/// `false` once, [`move_next`](Self::move_next) keeps returning `false`.
pub struct StreamingLoadCursor<S: RecordSource> {
    types: Vec<Arc<TypeSchema>>,
    source: S,
    key_factory: Arc<dyn RecordKeyFactory>,
    observers: Arc<LoaderObservers>,
    index: CacheLoaderIndex,
    active: Option<ActiveType>,
    current: Option<LoadItem>,
    errors: Vec<TypeLoadError>,
    exhausted: bool,
}

impl<S: RecordSource> StreamingLoadCursor<S> {
    pub fn new(
        types: Vec<Arc<TypeSchema>>,
        source: S,
        key_factory: Arc<dyn RecordKeyFactory>,
        observers: Arc<LoaderObservers>,
    ) -> Self {
        let index = CacheLoaderIndex::new(source.bind_strategy());
        Self {
            types,
            source,
            key_factory,
            observers,
            index,
            active: None,
            current: None,
            errors: Vec::new(),
            exhausted: false,
        }
    }

    /// Advance to the next record. Returns `false` once every type is drained.
    pub fn move_next(&mut self) -> bool {
        self.current = None;
        if self.exhausted {
            return false;
        }
        loop {
            if let Some(active) = self.active.as_mut() {
                match active.records.next() {
                    Some(Ok(record)) => {
                        self.index.record_cursor += 1;
                        self.index.yielded_since_start += 1;
                        self.current = Some(LoadItem {
                            record,
                            key_generator: active.key_generator.clone(),
                            type_id: active.type_id.clone(),
                        });
                        return true;
                    }
                    Some(Err(error)) => {
                        let type_id = active.type_id.clone();
                        self.close_active();
                        self.record_error(type_id, error);
                    }
                    None => self.close_active(),
                }
                continue;
            }

            if self.index.type_cursor >= self.types.len() {
                self.exhausted = true;
                self.publish_progress(100);
                return false;
            }

            let position = self.index.type_cursor;
            let schema = Arc::clone(&self.types[position]);
            let percent = (position * 100 / self.types.len()) as u32;
            self.publish_progress(percent);
            self.index.type_cursor += 1;
            self.index.record_cursor = 0;
            self.open(&schema);
        }
    }

    /// The item produced by the last successful [`move_next`](Self::move_next).
    pub fn current(&self) -> Option<&LoadItem> {
        self.current.as_ref()
    }

    pub fn index(&self) -> &CacheLoaderIndex {
        &self.index
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Drain the per-type failures recorded so far.
    pub fn take_errors(&mut self) -> Vec<TypeLoadError> {
        std::mem::take(&mut self.errors)
    }

    /// Release the open stream and reset the index.
    pub fn dispose(&mut self) {
        if self.active.is_some() {
            self.close_active();
        }
        self.current = None;
        self.index = CacheLoaderIndex::new(self.index.bind_strategy);
        self.exhausted = false;
    }

    fn open(&mut self, schema: &Arc<TypeSchema>) {
        let type_id = schema.type_id.clone();
        if let Err(e) = self.observers.on_begin_type(&type_id) {
            warn!(type_id = %type_id, error = %e, "begin-type notification failed");
        }
        match self.source.open(schema) {
            Ok(records) => {
                debug!(type_id = %type_id, strategy = ?self.index.bind_strategy, "opened type");
                self.active = Some(ActiveType {
                    key_generator: self.key_factory.generator_for(schema),
                    type_id,
                    records,
                });
            }
            Err(error) => {
                self.end_type(&type_id);
                self.record_error(type_id, error);
            }
        }
    }

    fn close_active(&mut self) {
        if let Some(active) = self.active.take() {
            debug!(type_id = %active.type_id, records = self.index.record_cursor, "closed type");
            self.end_type(&active.type_id);
        }
    }

    fn end_type(&self, type_id: &TypeId) {
        if let Err(e) = self.observers.on_end_type(type_id) {
            warn!(type_id = %type_id, error = %e, "end-type notification failed");
        }
    }

    fn record_error(&mut self, type_id: TypeId, error: LoadError) {
        warn!(type_id = %type_id, error = %error, "type load failed, skipping");
        if let Err(e) = self.observers.on_load_error(&type_id, &error.to_string()) {
            warn!(type_id = %type_id, error = %e, "load-error notification failed");
        }
        self.errors.push(TypeLoadError { type_id, error });
    }

    fn publish_progress(&self, percent: u32) {
        if let Err(e) = self.observers.on_progress(100, percent) {
            warn!(percent, error = %e, "progress notification failed");
        }
    }
}

impl<S: RecordSource> Iterator for StreamingLoadCursor<S> {
    type Item = LoadItem;

    fn next(&mut self) -> Option<LoadItem> {
        if self.move_next() {
            self.current.take()
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use dcache_events::ObserverError;
    use dcache_types::{
        FieldDescriptor, FieldKind, FieldValue, PropertySchema, RecordDescriptor, SchemaKeyFactory,
    };

    use crate::query::InMemorySourceContext;
    use crate::source::QueryRecordSource;

    #[derive(Default)]
    struct Recorder {
        progress: Mutex<Vec<u32>>,
        errors: Mutex<Vec<String>>,
        begun: Mutex<Vec<String>>,
        ended: Mutex<Vec<String>>,
    }

    impl CacheLoaderObserver for Recorder {
        fn on_progress(&self, _total: u32, current: u32) -> Result<(), ObserverError> {
            self.progress.lock().unwrap().push(current);
            Ok(())
        }

        fn on_load_error(&self, type_id: &TypeId, _message: &str) -> Result<(), ObserverError> {
            self.errors.lock().unwrap().push(type_id.to_string());
            Ok(())
        }

        fn type_load_observer(&self) -> Option<&dyn TypeLoadObserver> {
            Some(self)
        }
    }

    impl TypeLoadObserver for Recorder {
        fn on_begin_type(&self, type_id: &TypeId) -> Result<(), ObserverError> {
            self.begun.lock().unwrap().push(type_id.to_string());
            Ok(())
        }

        fn on_end_type(&self, type_id: &TypeId) -> Result<(), ObserverError> {
            self.ended.lock().unwrap().push(type_id.to_string());
            Ok(())
        }
    }

    fn schema(name: &str) -> Arc<TypeSchema> {
        Arc::new(
            TypeSchema::new(TypeId::new(name))
                .with_property(PropertySchema::key("id", FieldKind::Int)),
        )
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

    fn cursor(
        types: &[&str],
        ctx: Arc<InMemorySourceContext>,
    ) -> (StreamingLoadCursor<QueryRecordSource>, Arc<Recorder>) {
        let recorder = Arc::new(Recorder::default());
        let observers = Arc::new(LoaderObservers::new());
        observers.add(recorder.clone());
        let cursor = StreamingLoadCursor::new(
            types.iter().map(|t| schema(t)).collect(),
            QueryRecordSource::new(ctx),
            Arc::new(SchemaKeyFactory),
            observers,
        );
        (cursor, recorder)
    }

    #[test]
    fn yields_every_record_then_false_once_and_forever() {
        let (mut cursor, _) = cursor(&["a.A", "a.B"], source(&[("a.A", 2), ("a.B", 3)]));
        let mut pulled = 0;
        while cursor.move_next() {
            assert!(cursor.current().is_some());
            pulled += 1;
        }
        assert_eq!(pulled, 5);
        assert!(!cursor.move_next());
        assert!(cursor.current().is_none());
        assert_eq!(cursor.index().yielded_since_start, 5);
        assert_eq!(cursor.index().bind_strategy, BindStrategy::LiveQuery);
    }

    #[test]
    fn items_carry_type_and_generator() {
        let (cursor, _) = cursor(&["a.A"], source(&[("a.A", 1)]));
        let items: Vec<_> = cursor.collect();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].type_id, TypeId::new("a.A"));
        let key = items[0].key_generator.as_ref().unwrap().key_for(&items[0].record).unwrap();
        assert_eq!(key.to_string(), "a.A[0]");
    }

    #[test]
    fn progress_is_per_type_then_100() {
        let (cursor, recorder) = cursor(
            &["a.A", "a.B", "a.C"],
            source(&[("a.A", 4), ("a.B", 4), ("a.C", 4)]),
        );
        assert_eq!(cursor.count(), 12);
        assert_eq!(*recorder.progress.lock().unwrap(), vec![0, 33, 66, 100]);
    }

    #[test]
    fn failing_query_skips_only_that_type() {
        let ctx = source(&[("a.A", 2), ("a.B", 2), ("a.C", 2)]);
        ctx.fail_queries(&TypeId::new("a.B"), true);
        let (mut cursor, recorder) = cursor(&["a.A", "a.B", "a.C"], ctx);
        let types: Vec<_> = cursor.by_ref().map(|i| i.type_id.to_string()).collect();
        assert_eq!(types, ["a.A", "a.A", "a.C", "a.C"]);
        assert_eq!(*recorder.errors.lock().unwrap(), vec!["a.B".to_string()]);

        let errors = cursor.take_errors();
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0].error, LoadError::Query { .. }));
    }

    #[test]
    fn record_error_abandons_type() {
        let ctx = source(&[("a.A", 5), ("a.B", 1)]);
        ctx.fail_after(&TypeId::new("a.A"), Some(2));
        let (mut cursor, recorder) = cursor(&["a.A", "a.B"], ctx);
        let types: Vec<_> = cursor.by_ref().map(|i| i.type_id.to_string()).collect();
        assert_eq!(types, ["a.A", "a.A", "a.B"]);
        assert_eq!(*recorder.errors.lock().unwrap(), vec!["a.A".to_string()]);
        assert!(matches!(cursor.take_errors()[0].error, LoadError::Record { .. }));
    }

    #[test]
    fn all_types_failing_returns_false_immediately() {
        let (mut cursor, recorder) = cursor(&["x.Missing", "y.Missing"], source(&[]));
        assert!(!cursor.move_next());
        assert_eq!(cursor.take_errors().len(), 2);
        assert_eq!(*recorder.progress.lock().unwrap(), vec![0, 50, 100]);
    }

    #[test]
    fn empty_type_list_is_exhausted() {
        let (mut cursor, recorder) = cursor(&[], source(&[]));
        assert!(!cursor.move_next());
        assert_eq!(*recorder.progress.lock().unwrap(), vec![100]);
    }

    #[test]
    fn begin_and_end_pair_up() {
        let ctx = source(&[("a.A", 1)]);
        let (cursor, recorder) = cursor(&["a.A", "a.Gone"], ctx);
        assert_eq!(cursor.count(), 1);
        assert_eq!(*recorder.begun.lock().unwrap(), ["a.A", "a.Gone"]);
        assert_eq!(*recorder.ended.lock().unwrap(), ["a.A", "a.Gone"]);
    }

    #[test]
    fn dispose_resets_index() {
        let (mut cursor, _) = cursor(&["a.A"], source(&[("a.A", 3)]));
        assert!(cursor.move_next());
        cursor.dispose();
        assert_eq!(cursor.index().type_cursor, 0);
        assert_eq!(cursor.index().yielded_since_start, 0);
        assert!(!cursor.is_exhausted());
    }
}
