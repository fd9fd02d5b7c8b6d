//! Snapshot archive format for dcache.
//!
//! A delta transfer carries the snapshots a client is missing as one
//! sequential archive: a preamble followed by sections, each a CRC-checked
//! [`VersionStamp`](dcache_types::VersionStamp) header and a zstd-compressed
//! payload streamed in fixed-size chunks.
//!
//! - [`ArchiveWriter`] / [`build_package`]: stream `(stamp, bytes)` pairs out
//! - [`SnapshotArchive`]: single-pass read view lending one [`ArchiveSection`]
//!   stream at a time
//! - [`SnapshotNegotiation`]: which server snapshots are stale locally

pub mod config;
pub mod error;
pub mod negotiation;
pub mod reader;
mod varint;
pub mod writer;

pub use config::ArchiveConfig;
pub use error::{PackError, PackResult};
pub use negotiation::{Negotiation, SnapshotNegotiation};
pub use reader::{ArchiveEntries, ArchiveSection, SnapshotArchive};
pub use writer::{build_package, ArchiveWriter};
