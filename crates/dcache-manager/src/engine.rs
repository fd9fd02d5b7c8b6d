use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, RwLock};

use dcache_loader::{CacheLoader, LoadBatch, LoadError, LoadResult, LoadedEntry};
use dcache_types::{EntryRecord, RecordKey, TypeId};
use tracing::{debug, info};

use crate::error::{EngineError, EngineResult};
use crate::index::IndexDescriptor;

/// Everything an engine needs to build and populate a cache.
pub struct EngineConfig {
    /// Loader driven by [`CacheEngine::load`].
    pub loader: Box<dyn CacheLoader>,
    pub indexes: Vec<IndexDescriptor>,
    /// Entries requested per `load_next` call.
    pub batch_size: usize,
}

/// The key/value cache the lifecycle manager populates and reconciles.
pub trait CacheEngine: Send + Sync {
    /// Run the configured loader to completion. Returns the number of entries
    /// stored.
    fn load(&self) -> EngineResult<u64>;

    /// Keys of every cached entry of `type_id`.
    fn search_keys(&self, type_id: &TypeId) -> EngineResult<Vec<RecordKey>>;

    fn get(&self, key: &RecordKey) -> Option<EntryRecord>;

    /// Insert `entry`, replacing any entry with the same key in place.
    /// Returns `true` if an entry was replaced.
    fn upsert(&self, entry: LoadedEntry) -> EngineResult<bool>;

    /// Returns `true` if an entry was removed.
    fn remove(&self, key: &RecordKey) -> EngineResult<bool>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn indexes(&self) -> Vec<IndexDescriptor>;
}

/// Builds a [`CacheEngine`] from its configuration.
pub trait CacheEngineFactory: Send + Sync {
    fn create(&self, config: EngineConfig) -> EngineResult<Arc<dyn CacheEngine>>;
}

/// Drive `loader` until it returns `false`, handing each non-empty batch to
/// `apply`. Returns the number of entries pulled.
pub fn pump<F>(loader: &mut dyn CacheLoader, batch_size: usize, mut apply: F) -> LoadResult<u64>
where
    F: FnMut(Vec<LoadedEntry>),
{
    let mut batch = LoadBatch::new(batch_size);
    let mut position = None;
    let mut pulled = 0u64;
    loop {
        let more = loader.load_next(&mut batch, &mut position)?;
        if !batch.is_empty() {
            let entries: Vec<_> = batch.drain().collect();
            pulled += entries.len() as u64;
            apply(entries);
        }
        if !more {
            return Ok(pulled);
        }
    }
}

struct CachedEntry {
    key: RecordKey,
    record: EntryRecord,
}

/// Process-local [`CacheEngine`] keyed by the string form of each key.
///
/// Search and remove failures can be injected per type and per key.
pub struct InMemoryCacheEngine {
    entries: RwLock<BTreeMap<String, CachedEntry>>,
    loader: Mutex<Option<Box<dyn CacheLoader>>>,
    indexes: Vec<IndexDescriptor>,
    batch_size: usize,
    failing_searches: Mutex<BTreeSet<TypeId>>,
    failing_removes: Mutex<BTreeSet<String>>,
}

impl InMemoryCacheEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            loader: Mutex::new(Some(config.loader)),
            indexes: config.indexes,
            batch_size: config.batch_size,
            failing_searches: Mutex::new(BTreeSet::new()),
            failing_removes: Mutex::new(BTreeSet::new()),
        }
    }

    /// Make searches for `type_id` fail.
    pub fn fail_search(&self, type_id: &TypeId, fail: bool) {
        let mut failing = self.failing_searches.lock().expect("engine lock poisoned");
        if fail {
            failing.insert(type_id.clone());
        } else {
            failing.remove(type_id);
        }
    }

    /// Make removing `key` fail.
    pub fn fail_remove(&self, key: &RecordKey, fail: bool) {
        let mut failing = self.failing_removes.lock().expect("engine lock poisoned");
        if fail {
            failing.insert(key.to_string());
        } else {
            failing.remove(&key.to_string());
        }
    }

    /// String forms of every cached key, sorted.
    pub fn keys(&self) -> Vec<String> {
        self.entries
            .read()
            .expect("engine lock poisoned")
            .keys()
            .cloned()
            .collect()
    }
}

impl CacheEngine for InMemoryCacheEngine {
    fn load(&self) -> EngineResult<u64> {
        let mut slot = self.loader.lock().expect("engine loader lock poisoned");
        let loader = slot
            .as_mut()
            .ok_or(EngineError::Load(LoadError::InvalidState("engine has no loader")))?;
        let mut stored = 0u64;
        let mut failed = None;
        pump(&mut **loader, self.batch_size, |entries| {
            for entry in entries {
                match self.upsert(entry) {
                    Ok(_) => stored += 1,
                    Err(e) => failed = Some(e),
                }
            }
        })?;
        if let Some(e) = failed {
            return Err(e);
        }
        info!(stored, "cache loaded");
        Ok(stored)
    }

    fn search_keys(&self, type_id: &TypeId) -> EngineResult<Vec<RecordKey>> {
        if self
            .failing_searches
            .lock()
            .expect("engine lock poisoned")
            .contains(type_id)
        {
            return Err(EngineError::Search {
                type_id: type_id.clone(),
                reason: "search rejected by engine".into(),
            });
        }
        Ok(self
            .entries
            .read()
            .expect("engine lock poisoned")
            .values()
            .filter(|e| &e.key.type_id == type_id)
            .map(|e| e.key.clone())
            .collect())
    }

    fn get(&self, key: &RecordKey) -> Option<EntryRecord> {
        self.entries
            .read()
            .expect("engine lock poisoned")
            .get(&key.to_string())
            .map(|e| e.record.clone())
    }

    fn upsert(&self, entry: LoadedEntry) -> EngineResult<bool> {
        let cached = CachedEntry {
            key: entry.key,
            record: entry.record,
        };
        let replaced = self
            .entries
            .write()
            .expect("engine lock poisoned")
            .insert(cached.key.to_string(), cached)
            .is_some();
        Ok(replaced)
    }

    fn remove(&self, key: &RecordKey) -> EngineResult<bool> {
        let text = key.to_string();
        if self
            .failing_removes
            .lock()
            .expect("engine lock poisoned")
            .contains(&text)
        {
            return Err(EngineError::Remove {
                key: text,
                reason: "remove rejected by engine".into(),
            });
        }
        let removed = self
            .entries
            .write()
            .expect("engine lock poisoned")
            .remove(&text)
            .is_some();
        debug!(key = %text, removed, "cache entry removed");
        Ok(removed)
    }

    fn len(&self) -> usize {
        self.entries.read().expect("engine lock poisoned").len()
    }

    fn indexes(&self) -> Vec<IndexDescriptor> {
        self.indexes.clone()
    }
}

/// Factory for [`InMemoryCacheEngine`]s that keeps the engines it creates so
/// callers can inspect them.
#[derive(Default)]
pub struct InMemoryEngineFactory {
    created: Mutex<Vec<Arc<InMemoryCacheEngine>>>,
}

impl InMemoryEngineFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// The most recently created engine.
    pub fn last(&self) -> Option<Arc<InMemoryCacheEngine>> {
        self.created.lock().expect("factory lock poisoned").last().cloned()
    }
}

impl CacheEngineFactory for InMemoryEngineFactory {
    fn create(&self, config: EngineConfig) -> EngineResult<Arc<dyn CacheEngine>> {
        let engine = Arc::new(InMemoryCacheEngine::new(config));
        self.created
            .lock()
            .expect("factory lock poisoned")
            .push(Arc::clone(&engine));
        Ok(engine)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use dcache_loader::LoadPosition;
    use dcache_types::{FieldDescriptor, FieldKind, FieldValue, RecordDescriptor};

    fn entry(id: i64, name: &str) -> LoadedEntry {
        let desc = Arc::new(
            RecordDescriptor::new(vec![
                FieldDescriptor::new("id", FieldKind::Int),
                FieldDescriptor::new("name", FieldKind::Text),
            ])
            .unwrap(),
        );
        let type_id = TypeId::new("a.X");
        LoadedEntry {
            key: RecordKey::new(type_id.clone(), vec![FieldValue::Int(id)]),
            record: EntryRecord::new(desc, vec![FieldValue::Int(id), name.into()]).unwrap(),
            type_id,
        }
    }

    /// Yields a fixed list of entries, `per_call` at a time.
    struct ListLoader {
        pending: Vec<LoadedEntry>,
        per_call: usize,
    }

    impl CacheLoader for ListLoader {
        fn init(&mut self, _params: &BTreeMap<String, String>) -> LoadResult<()> {
            Ok(())
        }

        fn load_next(
            &mut self,
            batch: &mut LoadBatch,
            position: &mut Option<LoadPosition>,
        ) -> LoadResult<bool> {
            if self.pending.is_empty() {
                *position = None;
                return Ok(false);
            }
            let take = self.per_call.min(self.pending.len());
            for entry in self.pending.drain(..take) {
                batch.push(entry);
            }
            Ok(true)
        }

        fn dispose(&mut self) {}
    }

    fn engine(entries: Vec<LoadedEntry>) -> InMemoryCacheEngine {
        InMemoryCacheEngine::new(EngineConfig {
            loader: Box::new(ListLoader {
                pending: entries,
                per_call: 2,
            }),
            indexes: Vec::new(),
            batch_size: 2,
        })
    }

    #[test]
    fn load_stores_every_entry() {
        let engine = engine(vec![entry(1, "a"), entry(2, "b"), entry(3, "c")]);
        assert_eq!(engine.load().unwrap(), 3);
        assert_eq!(engine.keys(), ["a.X[1]", "a.X[2]", "a.X[3]"]);
    }

    #[test]
    fn upsert_replaces_in_place() {
        let engine = engine(Vec::new());
        assert!(!engine.upsert(entry(1, "old")).unwrap());
        assert!(engine.upsert(entry(1, "new")).unwrap());
        assert_eq!(engine.len(), 1);
        let record = engine.get(&entry(1, "").key).unwrap();
        assert_eq!(record.get("name"), Some(&FieldValue::from("new")));
    }

    #[test]
    fn injected_failures() {
        let engine = engine(Vec::new());
        engine.upsert(entry(1, "a")).unwrap();
        let type_id = TypeId::new("a.X");

        engine.fail_search(&type_id, true);
        assert!(matches!(engine.search_keys(&type_id), Err(EngineError::Search { .. })));
        engine.fail_search(&type_id, false);
        assert_eq!(engine.search_keys(&type_id).unwrap().len(), 1);
        assert!(engine.search_keys(&TypeId::new("a.Other")).unwrap().is_empty());

        let key = entry(1, "").key;
        engine.fail_remove(&key, true);
        assert!(engine.remove(&key).is_err());
        engine.fail_remove(&key, false);
        assert!(engine.remove(&key).unwrap());
        assert!(!engine.remove(&key).unwrap());
    }

    #[test]
    fn pump_counts_and_stops() {
        let mut loader = ListLoader {
            pending: vec![entry(1, "a"), entry(2, "b"), entry(3, "c")],
            per_call: 2,
        };
        let mut batches = Vec::new();
        let pulled = pump(&mut loader, 2, |entries| batches.push(entries.len())).unwrap();
        assert_eq!(pulled, 3);
        assert_eq!(batches, [2, 1]);
    }
}
