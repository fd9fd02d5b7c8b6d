//! File-backed snapshot storage for dcache.
//!
//! A snapshot is the full record set of one entity type at one version. The
//! [`LocalSnapshotStore`] keeps one snapshot file per type in a flat
//! directory, named by a content digest of the type's qualified name, and the
//! [`codec`] module defines the binary layout those files share with archive
//! sections.
//!
//! # Design Rules
//!
//! 1. One snapshot per type; re-insertion overwrites.
//! 2. Write to a temporary file, then publish with an atomic rename.
//! 3. Enumeration skips unreadable files instead of failing.
//! 4. Live snapshots are single-pass; deserialized snapshots are replayable.

pub mod codec;
pub mod error;
pub mod local;
pub mod snapshot;

pub use codec::SnapshotHeader;
pub use error::{StoreError, StoreResult};
pub use local::{LocalSnapshotStore, SNAPSHOT_EXTENSION};
pub use snapshot::{EntrySnapshot, RecordStream};
