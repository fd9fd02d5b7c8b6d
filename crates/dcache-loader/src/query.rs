use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use dcache_types::{EntryRecord, FieldDescriptor, FieldValue, RecordDescriptor, TypeId};

use crate::error::{LoadError, LoadResult};

/// Owned, single-pass sequence of records produced by a query or snapshot.
pub type RecordStream = Box<dyn Iterator<Item = LoadResult<EntryRecord>> + Send>;

/// A full-entity query: `from(entity).select(columns).no_use_cache()`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntityQuery {
    pub entity: TypeId,
    pub projection: Vec<String>,
    /// Whether the source may answer from its own result cache.
    pub use_cache: bool,
}

impl EntityQuery {
    pub fn from(entity: TypeId) -> Self {
        Self {
            entity,
            projection: Vec::new(),
            use_cache: true,
        }
    }

    pub fn select<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.projection.extend(columns.into_iter().map(Into::into));
        self
    }

    pub fn no_use_cache(mut self) -> Self {
        self.use_cache = false;
        self
    }
}

/// Queryable data source the direct loading path reads from.
pub trait SourceContext: Send + Sync {
    /// Execute `query`, returning its records as a lazy stream.
    fn execute(&self, query: &EntityQuery) -> LoadResult<RecordStream>;
}

struct Table {
    descriptor: Arc<RecordDescriptor>,
    rows: Vec<Vec<FieldValue>>,
    /// Fail the query outright.
    fail_query: bool,
    /// Yield a record error after this many rows.
    fail_after: Option<usize>,
}

/// In-memory [`SourceContext`] holding one table per entity type.
///
/// Queries project the selected columns in order; selecting an unknown column
/// fails the query. Failures can be injected per type.
#[derive(Default)]
pub struct InMemorySourceContext {
    tables: RwLock<BTreeMap<TypeId, Table>>,
}

impl InMemorySourceContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the rows of `type_id`.
    pub fn set_table(
        &self,
        type_id: TypeId,
        descriptor: Arc<RecordDescriptor>,
        rows: Vec<Vec<FieldValue>>,
    ) {
        self.tables.write().expect("source lock poisoned").insert(
            type_id,
            Table {
                descriptor,
                rows,
                fail_query: false,
                fail_after: None,
            },
        );
    }

    /// Make every query against `type_id` fail.
    pub fn fail_queries(&self, type_id: &TypeId, fail: bool) {
        if let Some(table) = self.tables.write().expect("source lock poisoned").get_mut(type_id) {
            table.fail_query = fail;
        }
    }

    /// Make reads of `type_id` fail after `rows` records.
    pub fn fail_after(&self, type_id: &TypeId, rows: Option<usize>) {
        if let Some(table) = self.tables.write().expect("source lock poisoned").get_mut(type_id) {
            table.fail_after = rows;
        }
    }

    pub fn row_count(&self, type_id: &TypeId) -> usize {
        self.tables
            .read()
            .expect("source lock poisoned")
            .get(type_id)
            .map(|t| t.rows.len())
            .unwrap_or(0)
    }
}

impl SourceContext for InMemorySourceContext {
    fn execute(&self, query: &EntityQuery) -> LoadResult<RecordStream> {
        let tables = self.tables.read().expect("source lock poisoned");
        let query_error = |reason: String| LoadError::Query {
            type_id: query.entity.clone(),
            reason,
        };
        let table = tables
            .get(&query.entity)
            .ok_or_else(|| query_error("unknown entity".into()))?;
        if table.fail_query {
            return Err(query_error("query rejected by source".into()));
        }

        let by_name: HashMap<&str, usize> = table
            .descriptor
            .fields()
            .iter()
            .enumerate()
            .map(|(i, f)| (f.name.as_str(), i))
            .collect();
        let mut positions = Vec::with_capacity(query.projection.len());
        let mut fields = Vec::with_capacity(query.projection.len());
        for column in &query.projection {
            let pos = *by_name
                .get(column.as_str())
                .ok_or_else(|| query_error(format!("unknown column {column}")))?;
            positions.push(pos);
            fields.push(FieldDescriptor::new(
                column.clone(),
                table.descriptor.fields()[pos].kind,
            ));
        }
        let descriptor = Arc::new(
            RecordDescriptor::new(fields).map_err(|e| query_error(e.to_string()))?,
        );

        let type_id = query.entity.clone();
        let fail_after = table.fail_after;
        let rows: Vec<Vec<FieldValue>> = table
            .rows
            .iter()
            .map(|row| {
                positions
                    .iter()
                    .map(|&p| row.get(p).cloned().unwrap_or(FieldValue::Null))
                    .collect()
            })
            .collect();

        let stream = rows.into_iter().enumerate().map(move |(i, values)| {
            if fail_after == Some(i) {
                return Err(LoadError::Record {
                    type_id: type_id.clone(),
                    reason: "connection reset".into(),
                });
            }
            EntryRecord::new(Arc::clone(&descriptor), values).map_err(|e| LoadError::Record {
                type_id: type_id.clone(),
                reason: e.to_string(),
            })
        });
        Ok(Box::new(stream))
    }
}
