use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{TypeError, TypeResult};

/// Identity of a cached entity type.
///
/// Wraps the type's fully qualified name (e.g. `"sales.Customer"`). Equality,
/// hashing and ordering all go through the qualified name, so two identifiers
/// built independently from the same name are interchangeable. Sorting a list
/// of `TypeId`s sorts by qualified name.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TypeId(String);

impl TypeId {
    /// Create an identifier from a fully qualified name.
    ///
    /// Surrounding whitespace is trimmed. Use [`TypeId::parse`] when the
    /// name comes from untrusted input and emptiness must be rejected.
    pub fn new(qualified_name: impl Into<String>) -> Self {
        let name: String = qualified_name.into();
        let trimmed = name.trim();
        if trimmed.len() == name.len() {
            Self(name)
        } else {
            Self(trimmed.to_string())
        }
    }

    /// Parse an identifier, rejecting empty names.
    pub fn parse(qualified_name: &str) -> TypeResult<Self> {
        let trimmed = qualified_name.trim();
        if trimmed.is_empty() {
            return Err(TypeError::InvalidTypeId(qualified_name.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// The fully qualified name.
    pub fn qualified_name(&self) -> &str {
        &self.0
    }

    /// The last segment of the qualified name (after the final `.` or `::`).
    pub fn simple_name(&self) -> &str {
        let tail = self.0.rsplit("::").next().unwrap_or(&self.0);
        tail.rsplit('.').next().unwrap_or(tail)
    }
}

impl fmt::Debug for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeId({})", self.0)
    }
}

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TypeId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for TypeId {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}
