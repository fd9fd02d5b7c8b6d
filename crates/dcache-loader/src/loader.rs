use std::collections::BTreeMap;
use std::sync::Arc;

use dcache_events::{CacheLoaderObserver, LoaderObservers};
use dcache_types::{
    EntryRecord, RecordKey, RecordKeyFactory, SchemaCatalog, TypeId, TypeRegistry, TypeSchema,
};
use tracing::warn;

use crate::cursor::{LoadItem, StreamingLoadCursor, TypeLoadError};
use crate::error::{LoadError, LoadResult};
use crate::source::RecordSource;

/// Loader parameter naming an explicit comma-separated type list.
pub const TYPES_PARAM: &str = "types";

/// A keyed record ready to be placed in the cache.
#[derive(Clone, Debug)]
pub struct LoadedEntry {
    pub key: RecordKey,
    pub record: EntryRecord,
    pub type_id: TypeId,
}

impl LoadedEntry {
    /// Key `item`, or `None` if its type has no generator or the record lacks
    /// a key field.
    pub fn from_item(item: LoadItem) -> Option<Self> {
        let key = item.key_generator.as_ref()?.key_for(&item.record)?;
        Some(Self {
            key,
            record: item.record,
            type_id: item.type_id,
        })
    }
}

/// Ordered batch of entries filled by one [`CacheLoader::load_next`] call.
#[derive(Debug)]
pub struct LoadBatch {
    entries: Vec<LoadedEntry>,
    capacity: usize,
}

impl LoadBatch {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, entry: LoadedEntry) {
        self.entries.push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &LoadedEntry> {
        self.entries.iter()
    }

    /// Take every entry, leaving the batch empty for the next call.
    pub fn drain(&mut self) -> std::vec::Drain<'_, LoadedEntry> {
        self.entries.drain(..)
    }
}

/// Resume token handed back and forth with the cache engine.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoadPosition {
    pub types_opened: usize,
    pub records_loaded: u64,
}

/// Pull-based loader driven by the cache engine.
///
/// The engine calls [`load_next`](Self::load_next) until it returns `false`.
/// Each call appends up to the batch capacity of keyed entries. After a
/// `false`, the next call starts a fresh load.
pub trait CacheLoader: Send {
    fn init(&mut self, params: &BTreeMap<String, String>) -> LoadResult<()>;

    fn load_next(
        &mut self,
        batch: &mut LoadBatch,
        position: &mut Option<LoadPosition>,
    ) -> LoadResult<bool>;

    /// Release any open stream and cancel in-flight work.
    fn dispose(&mut self);

    /// Per-type failures of the most recent load pass.
    fn load_errors(&self) -> &[TypeLoadError] {
        &[]
    }
}

/// Collaborators every loader needs.
#[derive(Clone)]
pub struct LoaderContext {
    pub registry: Arc<TypeRegistry>,
    pub catalog: Arc<SchemaCatalog>,
    pub key_factory: Arc<dyn RecordKeyFactory>,
    pub observers: Arc<LoaderObservers>,
}

impl LoaderContext {
    /// Look up the schema of every type. Types without metadata are reported
    /// and appended to `errors`.
    pub(crate) fn schemas_for(
        &self,
        types: &[TypeId],
        errors: &mut Vec<TypeLoadError>,
    ) -> Vec<Arc<TypeSchema>> {
        let mut schemas = Vec::with_capacity(types.len());
        for type_id in types {
            match self.catalog.get(type_id) {
                Some(schema) => schemas.push(schema),
                None => {
                    let error = LoadError::MetadataNotFound(type_id.clone());
                    warn!(type_id = %type_id, "no metadata for type, skipping");
                    if let Err(e) = self.observers.on_load_error(type_id, &error.to_string()) {
                        warn!(type_id = %type_id, error = %e, "load-error notification failed");
                    }
                    errors.push(TypeLoadError {
                        type_id: type_id.clone(),
                        error,
                    });
                }
            }
        }
        schemas
    }

    pub(crate) fn notify_started(&self) {
        if let Err(e) = self.observers.on_load_started() {
            warn!(error = %e, "load-started notification failed");
        }
    }

    pub(crate) fn notify_finished(&self) {
        if let Err(e) = self.observers.on_load_finished() {
            warn!(error = %e, "load-finished notification failed");
        }
    }
}

/// Split a comma-separated type list, ignoring blanks.
pub(crate) fn parse_type_list(value: &str) -> Vec<TypeId> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(TypeId::new)
        .collect()
}

/// State shared by both loaders between `load_next` calls.
pub(crate) enum Phase<S: RecordSource> {
    Idle,
    Loading(StreamingLoadCursor<S>),
    /// The cursor ran out during a call that still returned entries.
    Drained,
}

/// Move entries from `cursor` into `batch` until it is full. Returns `true`
/// when the cursor is exhausted.
pub(crate) fn fill_batch<S: RecordSource>(
    cursor: &mut StreamingLoadCursor<S>,
    batch: &mut LoadBatch,
) -> bool {
    while !batch.is_full() {
        match cursor.next() {
            Some(item) => {
                if let Some(entry) = LoadedEntry::from_item(item) {
                    batch.push(entry);
                }
            }
            None => return true,
        }
    }
    false
}

pub(crate) fn position_of<S: RecordSource>(cursor: &StreamingLoadCursor<S>) -> LoadPosition {
    LoadPosition {
        types_opened: cursor.index().type_cursor,
        records_loaded: cursor.index().yielded_since_start,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dcache_types::{FieldDescriptor, FieldKind, FieldValue, RecordDescriptor, SchemaKeyGenerator};

    fn item(with_generator: bool) -> LoadItem {
        let desc = Arc::new(
            RecordDescriptor::new(vec![FieldDescriptor::new("id", FieldKind::Int)]).unwrap(),
        );
        LoadItem {
            record: EntryRecord::new(desc, vec![FieldValue::Int(7)]).unwrap(),
            key_generator: with_generator.then(|| {
                Arc::new(SchemaKeyGenerator::new(TypeId::new("a.X"), vec!["id".into()]))
                    as Arc<dyn dcache_types::KeyGenerator>
            }),
            type_id: TypeId::new("a.X"),
        }
    }

    #[test]
    fn entry_requires_key() {
        assert!(LoadedEntry::from_item(item(false)).is_none());
        let entry = LoadedEntry::from_item(item(true)).unwrap();
        assert_eq!(entry.key.to_string(), "a.X[7]");
    }

    #[test]
    fn batch_capacity_is_at_least_one() {
        let mut batch = LoadBatch::new(0);
        assert!(!batch.is_full());
        batch.push(LoadedEntry::from_item(item(true)).unwrap());
        assert!(batch.is_full());
        assert_eq!(batch.drain().count(), 1);
        assert!(batch.is_empty());
    }

    #[test]
    fn type_list_parsing() {
        assert_eq!(
            parse_type_list(" a.X, ,b.Y "),
            vec![TypeId::new("a.X"), TypeId::new("b.Y")]
        );
        assert!(parse_type_list("").is_empty());
    }
}
