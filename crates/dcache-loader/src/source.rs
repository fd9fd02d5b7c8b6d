use std::sync::Arc;

use dcache_store::LocalSnapshotStore;
use dcache_types::TypeSchema;

use crate::error::{LoadError, LoadResult};
use crate::query::{EntityQuery, RecordStream, SourceContext};

/// How records reach the cursor, recorded in its index state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BindStrategy {
    /// Replayed from a locally stored snapshot.
    Snapshot,
    /// Streamed from a live query against the source.
    LiveQuery,
}

/// Opens the record stream of one entity type for a [`StreamingLoadCursor`].
///
/// [`StreamingLoadCursor`]: crate::cursor::StreamingLoadCursor
pub trait RecordSource: Send {
    fn bind_strategy(&self) -> BindStrategy;

    /// Open the records of `schema`'s type. A failure here skips the type.
    fn open(&mut self, schema: &TypeSchema) -> LoadResult<RecordStream>;
}

/// Reads types from their snapshots in a [`LocalSnapshotStore`].
#[derive(Clone, Debug)]
pub struct SnapshotRecordSource {
    store: Arc<LocalSnapshotStore>,
}

impl SnapshotRecordSource {
    pub fn new(store: Arc<LocalSnapshotStore>) -> Self {
        Self { store }
    }
}

impl RecordSource for SnapshotRecordSource {
    fn bind_strategy(&self) -> BindStrategy {
        BindStrategy::Snapshot
    }

    fn open(&mut self, schema: &TypeSchema) -> LoadResult<RecordStream> {
        let type_id = schema.type_id.clone();
        let snapshot = self
            .store
            .get(&type_id)?
            .ok_or_else(|| LoadError::SnapshotMissing(type_id.clone()))?;
        let records = snapshot.into_records()?;
        Ok(Box::new(records.map(move |r| {
            r.map_err(|e| LoadError::Record {
                type_id: type_id.clone(),
                reason: e.to_string(),
            })
        })))
    }
}

/// Reads types by querying a [`SourceContext`] for every declared column,
/// plus the revision column of version-tracked types, bypassing the source's
/// result cache.
pub struct QueryRecordSource {
    context: Arc<dyn SourceContext>,
}

impl QueryRecordSource {
    pub fn new(context: Arc<dyn SourceContext>) -> Self {
        Self { context }
    }

    pub fn query_for(schema: &TypeSchema) -> EntityQuery {
        EntityQuery::from(schema.type_id.clone())
            .select(schema.projection())
            .no_use_cache()
    }
}

impl RecordSource for QueryRecordSource {
    fn bind_strategy(&self) -> BindStrategy {
        BindStrategy::LiveQuery
    }

    fn open(&mut self, schema: &TypeSchema) -> LoadResult<RecordStream> {
        self.context.execute(&Self::query_for(schema))
    }
}
