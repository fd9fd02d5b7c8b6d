use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::record::FieldKind;
use crate::type_id::TypeId;

/// Synthetic column carrying the row revision of version-tracked types.
pub const REVISION_COLUMN: &str = "__revision";

/// Schema of one property of an entity type.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertySchema {
    pub name: String,
    pub kind: FieldKind,
    /// Part of the record key.
    pub is_key: bool,
    /// Eligible for a cache query index.
    pub indexable: bool,
}

impl PropertySchema {
    /// A plain, non-indexed property.
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            is_key: false,
            indexable: false,
        }
    }

    /// A key property.
    pub fn key(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            is_key: true,
            ..Self::new(name, kind)
        }
    }

    /// An indexable, non-key property.
    pub fn indexed(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            indexable: true,
            ..Self::new(name, kind)
        }
    }
}

/// Metadata of one entity type: its properties and whether it is
/// version-tracked.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeSchema {
    pub type_id: TypeId,
    pub properties: Vec<PropertySchema>,
    /// Version-tracked types carry a [`REVISION_COLUMN`].
    pub version_tracked: bool,
}

impl TypeSchema {
    pub fn new(type_id: TypeId) -> Self {
        Self {
            type_id,
            properties: Vec::new(),
            version_tracked: false,
        }
    }

    pub fn with_property(mut self, property: PropertySchema) -> Self {
        self.properties.push(property);
        self
    }

    pub fn with_version_tracking(mut self) -> Self {
        self.version_tracked = true;
        self
    }

    pub fn property(&self, name: &str) -> Option<&PropertySchema> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Names of the key properties, in declaration order.
    pub fn key_properties(&self) -> impl Iterator<Item = &PropertySchema> {
        self.properties.iter().filter(|p| p.is_key)
    }

    /// Columns a full-load query selects: every declared property, plus the
    /// revision column for version-tracked types when not already declared.
    pub fn projection(&self) -> Vec<String> {
        let mut columns: Vec<String> = self.properties.iter().map(|p| p.name.clone()).collect();
        if self.version_tracked && !columns.iter().any(|c| c == REVISION_COLUMN) {
            columns.push(REVISION_COLUMN.to_string());
        }
        columns
    }
}

/// Full catalogue of entity-type metadata known to the host.
#[derive(Clone, Debug, Default)]
pub struct SchemaCatalog {
    types: BTreeMap<TypeId, Arc<TypeSchema>>,
}

impl SchemaCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the schema for its type.
    pub fn insert(&mut self, schema: TypeSchema) -> &mut Self {
        self.types.insert(schema.type_id.clone(), Arc::new(schema));
        self
    }

    pub fn with(mut self, schema: TypeSchema) -> Self {
        self.insert(schema);
        self
    }

    pub fn get(&self, type_id: &TypeId) -> Option<Arc<TypeSchema>> {
        self.types.get(type_id).cloned()
    }

    pub fn contains(&self, type_id: &TypeId) -> bool {
        self.types.contains_key(type_id)
    }

    /// All schemas, sorted by qualified type name.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<TypeSchema>> {
        self.types.values()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn customer() -> TypeSchema {
        TypeSchema::new(TypeId::new("sales.Customer"))
            .with_property(PropertySchema::key("id", FieldKind::Int))
            .with_property(PropertySchema::indexed("name", FieldKind::Text))
            .with_property(PropertySchema::new("notes", FieldKind::Text))
    }

    #[test]
    fn projection_without_tracking() {
        assert_eq!(customer().projection(), ["id", "name", "notes"]);
    }

    #[test]
    fn projection_adds_revision_for_tracked_types() {
        let schema = customer().with_version_tracking();
        assert_eq!(schema.projection(), ["id", "name", "notes", REVISION_COLUMN]);
    }

    #[test]
    fn projection_does_not_duplicate_revision() {
        let schema = customer()
            .with_property(PropertySchema::new(REVISION_COLUMN, FieldKind::Int))
            .with_version_tracking();
        let projection = schema.projection();
        assert_eq!(projection.iter().filter(|c| *c == REVISION_COLUMN).count(), 1);
    }

    #[test]
    fn key_properties_in_order() {
        let schema = TypeSchema::new(TypeId::new("x.Line"))
            .with_property(PropertySchema::key("order", FieldKind::Int))
            .with_property(PropertySchema::new("qty", FieldKind::Int))
            .with_property(PropertySchema::key("line", FieldKind::Int));
        let keys: Vec<&str> = schema.key_properties().map(|p| p.name.as_str()).collect();
        assert_eq!(keys, ["order", "line"]);
    }

    #[test]
    fn catalog_lookup_and_order() {
        let catalog = SchemaCatalog::new()
            .with(TypeSchema::new(TypeId::new("z.Last")))
            .with(customer());
        assert_eq!(catalog.len(), 2);
        assert!(catalog.get(&TypeId::new("sales.Customer")).is_some());
        assert!(catalog.get(&TypeId::new("nope.Missing")).is_none());
        let names: Vec<&str> = catalog.iter().map(|s| s.type_id.qualified_name()).collect();
        assert_eq!(names, ["sales.Customer", "z.Last"]);
    }
}
