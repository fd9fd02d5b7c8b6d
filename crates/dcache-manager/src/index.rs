use dcache_types::{FieldKind, SchemaCatalog, TypeId, REVISION_COLUMN};

/// A query index the cache engine maintains for one column of one type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexDescriptor {
    pub type_id: TypeId,
    pub column: String,
    pub kind: FieldKind,
    pub is_key: bool,
}

/// Indexes for every key or indexable property in `catalog`, plus the
/// revision column of each version-tracked type.
pub fn index_descriptors(catalog: &SchemaCatalog) -> Vec<IndexDescriptor> {
    let mut indexes = Vec::new();
    for schema in catalog.iter() {
        let before = indexes.len();
        indexes.extend(
            schema
                .properties
                .iter()
                .filter(|p| p.is_key || p.indexable)
                .map(|p| IndexDescriptor {
                    type_id: schema.type_id.clone(),
                    column: p.name.clone(),
                    kind: p.kind,
                    is_key: p.is_key,
                }),
        );
        let has_revision = indexes[before..].iter().any(|i| i.column == REVISION_COLUMN);
        if schema.version_tracked && !has_revision {
            indexes.push(IndexDescriptor {
                type_id: schema.type_id.clone(),
                column: REVISION_COLUMN.to_string(),
                kind: FieldKind::Int,
                is_key: false,
            });
        }
    }
    indexes
}

#[cfg(test)]
mod tests {
    use super::*;
    use dcache_types::{PropertySchema, TypeSchema};

    #[test]
    fn keys_indexable_and_revision() {
        let catalog = SchemaCatalog::new()
            .with(
                TypeSchema::new(TypeId::new("sales.Order"))
                    .with_property(PropertySchema::key("id", FieldKind::Int))
                    .with_property(PropertySchema::indexed("customer", FieldKind::Text))
                    .with_property(PropertySchema::new("notes", FieldKind::Text))
                    .with_version_tracking(),
            )
            .with(
                TypeSchema::new(TypeId::new("sales.Region"))
                    .with_property(PropertySchema::new("name", FieldKind::Text)),
            );

        let columns: Vec<_> = index_descriptors(&catalog)
            .into_iter()
            .map(|i| format!("{}.{}", i.type_id.simple_name(), i.column))
            .collect();
        assert_eq!(
            columns,
            ["Order.id", "Order.customer", format!("Order.{REVISION_COLUMN}").as_str()]
        );
    }
}
