//! Foundation types for dcache.
//!
//! This crate provides the identity, versioning, record and schema types used
//! throughout the cache population engine. Every other dcache crate depends on
//! `dcache-types`.
//!
//! # Key Types
//!
//! - [`TypeId`] — Qualified name of a cached entity type
//! - [`Timestamp`] — Version of the data held for a type
//! - [`VersionStamp`] — (type, version) pair compared by type identity
//! - [`EntryRecord`] — Positional record values plus a shared [`RecordDescriptor`]
//! - [`RecordKey`] / [`KeyGenerator`] / [`RecordKeyFactory`] — Cache key construction
//! - [`TypeSchema`] / [`SchemaCatalog`] — Entity metadata consumed by loaders
//! - [`TypeRegistry`] — Sorted set of managed types
//! - [`BuildExecutionResult`] — Status of a remote cache build

pub mod build;
pub mod error;
pub mod key;
pub mod record;
pub mod registry;
pub mod schema;
pub mod temporal;
pub mod type_id;
pub mod version;

pub use build::{BuildExecutionResult, BuildExecutionState};
pub use error::{TypeError, TypeResult};
pub use key::{KeyGenerator, RecordKey, RecordKeyFactory, SchemaKeyFactory, SchemaKeyGenerator};
pub use record::{EntryRecord, FieldDescriptor, FieldKind, FieldValue, RecordDescriptor};
pub use registry::TypeRegistry;
pub use schema::{PropertySchema, SchemaCatalog, TypeSchema, REVISION_COLUMN};
pub use temporal::Timestamp;
pub use type_id::TypeId;
pub use version::{is_stale, VersionStamp};
