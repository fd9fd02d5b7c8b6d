use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{TypeError, TypeResult};
use crate::temporal::Timestamp;

/// Declared type of a record field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldKind {
    Bool,
    Int,
    Float,
    Text,
    Bytes,
    Timestamp,
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool => write!(f, "bool"),
            Self::Int => write!(f, "int"),
            Self::Float => write!(f, "float"),
            Self::Text => write!(f, "text"),
            Self::Bytes => write!(f, "bytes"),
            Self::Timestamp => write!(f, "timestamp"),
        }
    }
}

/// A single typed field value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Timestamp(Timestamp),
}

impl FieldValue {
    /// The kind of this value, or `None` for [`FieldValue::Null`].
    pub fn kind(&self) -> Option<FieldKind> {
        match self {
            Self::Null => None,
            Self::Bool(_) => Some(FieldKind::Bool),
            Self::Int(_) => Some(FieldKind::Int),
            Self::Float(_) => Some(FieldKind::Float),
            Self::Text(_) => Some(FieldKind::Text),
            Self::Bytes(_) => Some(FieldKind::Bytes),
            Self::Timestamp(_) => Some(FieldKind::Timestamp),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(v) => write!(f, "{v:?}"),
            Self::Bytes(v) => {
                write!(f, "0x")?;
                for b in v {
                    write!(f, "{b:02x}")?;
                }
                Ok(())
            }
            Self::Timestamp(v) => write!(f, "@{v}"),
        }
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

/// Name and type of one record field.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    pub kind: FieldKind,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// Ordered field layout shared by every record of one result set.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordDescriptor {
    fields: Vec<FieldDescriptor>,
}

impl RecordDescriptor {
    /// Build a descriptor, rejecting duplicate field names.
    pub fn new(fields: Vec<FieldDescriptor>) -> TypeResult<Self> {
        for (i, field) in fields.iter().enumerate() {
            if fields[..i].iter().any(|f| f.name == field.name) {
                return Err(TypeError::DuplicateField(field.name.clone()));
            }
        }
        Ok(Self { fields })
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Position of the field called `name`.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }
}

/// One record pulled from a data source or decoded from a snapshot.
///
/// Values are positional against the shared [`RecordDescriptor`]. Records are
/// never mutated after construction.
#[derive(Clone, Debug, PartialEq)]
pub struct EntryRecord {
    descriptor: Arc<RecordDescriptor>,
    values: Vec<FieldValue>,
}

impl EntryRecord {
    /// Create a record, checking that `values` matches the descriptor's arity.
    pub fn new(descriptor: Arc<RecordDescriptor>, values: Vec<FieldValue>) -> TypeResult<Self> {
        if descriptor.len() != values.len() {
            return Err(TypeError::RecordShape {
                expected: descriptor.len(),
                actual: values.len(),
            });
        }
        Ok(Self { descriptor, values })
    }

    pub fn descriptor(&self) -> &Arc<RecordDescriptor> {
        &self.descriptor
    }

    pub fn values(&self) -> &[FieldValue] {
        &self.values
    }

    /// Value of the field called `name`.
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.descriptor.position(name).map(|i| &self.values[i])
    }

    /// Consume the record, returning its values.
    pub fn into_values(self) -> Vec<FieldValue> {
        self.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor() -> Arc<RecordDescriptor> {
        Arc::new(
            RecordDescriptor::new(vec![
                FieldDescriptor::new("id", FieldKind::Int),
                FieldDescriptor::new("name", FieldKind::Text),
            ])
            .unwrap(),
        )
    }

    #[test]
    fn record_lookup_by_name() {
        let rec = EntryRecord::new(descriptor(), vec![FieldValue::Int(7), "ada".into()]).unwrap();
        assert_eq!(rec.get("id"), Some(&FieldValue::Int(7)));
        assert_eq!(rec.get("name"), Some(&FieldValue::Text("ada".into())));
        assert!(rec.get("missing").is_none());
    }

    #[test]
    fn record_arity_checked() {
        let err = EntryRecord::new(descriptor(), vec![FieldValue::Int(1)]).unwrap_err();
        assert_eq!(err, TypeError::RecordShape { expected: 2, actual: 1 });
    }

    #[test]
    fn duplicate_fields_rejected() {
        let err = RecordDescriptor::new(vec![
            FieldDescriptor::new("id", FieldKind::Int),
            FieldDescriptor::new("id", FieldKind::Text),
        ])
        .unwrap_err();
        assert_eq!(err, TypeError::DuplicateField("id".into()));
    }

    #[test]
    fn value_kinds() {
        assert_eq!(FieldValue::Null.kind(), None);
        assert_eq!(FieldValue::Int(1).kind(), Some(FieldKind::Int));
        assert_eq!(
            FieldValue::Timestamp(Timestamp::from_millis(0)).kind(),
            Some(FieldKind::Timestamp)
        );
    }

    #[test]
    fn value_display() {
        assert_eq!(FieldValue::Int(5).to_string(), "5");
        assert_eq!(FieldValue::Text("x".into()).to_string(), "\"x\"");
        assert_eq!(FieldValue::Bytes(vec![0xab, 0x01]).to_string(), "0xab01");
        assert_eq!(FieldValue::Null.to_string(), "null");
    }
}
