//! Cache loaders for dcache.
//!
//! A host cache engine drives a [`CacheLoader`] by calling `load_next` until it
//! returns `false`. Two loaders are provided:
//!
//! - [`BootstrapLoader`] fetches the snapshots the [`LocalSnapshotStore`] is
//!   missing through a [`SnapshotDownloader`], then streams every type from
//!   the store.
//! - [`DirectLoader`] queries the live [`SourceContext`] for every type.
//!
//! Both pull records through a [`StreamingLoadCursor`], which moves from one
//! type to the next and skips types that fail to open or stream.
//!
//! [`LocalSnapshotStore`]: dcache_store::LocalSnapshotStore

pub mod bootstrap;
pub mod cursor;
pub mod direct;
pub mod download;
pub mod error;
pub mod loader;
pub mod mirror;
pub mod query;
pub mod source;

pub use bootstrap::BootstrapLoader;
pub use cursor::{CacheLoaderIndex, LoadItem, StreamingLoadCursor, TypeLoadError};
pub use direct::DirectLoader;
pub use download::{download_channel, DownloadGate, DownloadOutcome, DownloadSink, SnapshotDownloader};
pub use error::{LoadError, LoadResult};
pub use loader::{CacheLoader, LoadBatch, LoadPosition, LoadedEntry, LoaderContext, TYPES_PARAM};
pub use mirror::MirrorDownloader;
pub use query::{EntityQuery, InMemorySourceContext, RecordStream, SourceContext};
pub use source::{BindStrategy, QueryRecordSource, RecordSource, SnapshotRecordSource};
