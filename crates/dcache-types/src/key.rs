use std::fmt;
use std::sync::Arc;

use crate::record::{EntryRecord, FieldValue};
use crate::schema::TypeSchema;
use crate::type_id::TypeId;

/// Strongly-typed cache key of one record.
///
/// The string form (`Display`) is `Type[part,part,...]` and is what the cache
/// engine indexes by; two keys are the same cache entry exactly when their
/// string forms match.
#[derive(Clone, Debug, PartialEq)]
pub struct RecordKey {
    pub type_id: TypeId,
    pub parts: Vec<FieldValue>,
}

impl RecordKey {
    pub fn new(type_id: TypeId, parts: Vec<FieldValue>) -> Self {
        Self { type_id, parts }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[", self.type_id)?;
        for (i, part) in self.parts.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{part}")?;
        }
        write!(f, "]")
    }
}

/// Builds the cache key of a record of one entity type.
pub trait KeyGenerator: Send + Sync {
    /// The key for `record`, or `None` if the record lacks a key field.
    fn key_for(&self, record: &EntryRecord) -> Option<RecordKey>;
}

/// Produces a [`KeyGenerator`] per entity type.
///
/// Passed explicitly to every component that generates keys.
pub trait RecordKeyFactory: Send + Sync {
    /// The generator for `schema`, or `None` if the type has no usable key.
    fn generator_for(&self, schema: &TypeSchema) -> Option<Arc<dyn KeyGenerator>>;
}

/// Key factory driven by the `is_key` flags of a [`TypeSchema`].
#[derive(Clone, Copy, Debug, Default)]
pub struct SchemaKeyFactory;

impl RecordKeyFactory for SchemaKeyFactory {
    fn generator_for(&self, schema: &TypeSchema) -> Option<Arc<dyn KeyGenerator>> {
        let key_fields: Vec<String> = schema.key_properties().map(|p| p.name.clone()).collect();
        if key_fields.is_empty() {
            return None;
        }
        Some(Arc::new(SchemaKeyGenerator {
            type_id: schema.type_id.clone(),
            key_fields,
        }))
    }
}

/// Key generator reading named key fields off a record.
#[derive(Clone, Debug)]
pub struct SchemaKeyGenerator {
    type_id: TypeId,
    key_fields: Vec<String>,
}

impl SchemaKeyGenerator {
    pub fn new(type_id: TypeId, key_fields: Vec<String>) -> Self {
        Self { type_id, key_fields }
    }
}

impl KeyGenerator for SchemaKeyGenerator {
    fn key_for(&self, record: &EntryRecord) -> Option<RecordKey> {
        let parts = self
            .key_fields
            .iter()
            .map(|name| record.get(name).cloned())
            .collect::<Option<Vec<_>>>()?;
        Some(RecordKey::new(self.type_id.clone(), parts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{FieldDescriptor, FieldKind, RecordDescriptor};
    use crate::schema::PropertySchema;

    fn order_schema() -> TypeSchema {
        TypeSchema::new(TypeId::new("sales.Order"))
            .with_property(PropertySchema::key("id", FieldKind::Int))
            .with_property(PropertySchema::new("total", FieldKind::Float))
    }

    fn order(id: i64) -> EntryRecord {
        let desc = RecordDescriptor::new(vec![
            FieldDescriptor::new("id", FieldKind::Int),
            FieldDescriptor::new("total", FieldKind::Float),
        ])
        .unwrap();
        EntryRecord::new(Arc::new(desc), vec![FieldValue::Int(id), FieldValue::Float(9.5)]).unwrap()
    }

    #[test]
    fn schema_factory_builds_keys() {
        let generator = SchemaKeyFactory.generator_for(&order_schema()).unwrap();
        let key = generator.key_for(&order(42)).unwrap();
        assert_eq!(key.to_string(), "sales.Order[42]");
        assert_eq!(key.parts, vec![FieldValue::Int(42)]);
    }

    #[test]
    fn keyless_schema_has_no_generator() {
        let schema = TypeSchema::new(TypeId::new("x.Log"))
            .with_property(PropertySchema::new("line", FieldKind::Text));
        assert!(SchemaKeyFactory.generator_for(&schema).is_none());
    }

    #[test]
    fn missing_key_field_yields_none() {
        let generator = SchemaKeyGenerator::new(TypeId::new("sales.Order"), vec!["nope".into()]);
        assert!(generator.key_for(&order(1)).is_none());
    }

    #[test]
    fn composite_key_display() {
        let key = RecordKey::new(
            TypeId::new("x.Line"),
            vec![FieldValue::Int(1), FieldValue::Text("a".into())],
        );
        assert_eq!(key.to_string(), "x.Line[1,\"a\"]");
    }
}
