//! Remote build watcher for dcache.
//!
//! A remote service may rebuild cache snapshots in a long-running job. The
//! [`RemoteBuildWatcher`] holds a time-limited lease on one such build, polls
//! its status through a [`BuildStatusClient`] and republishes start, message,
//! progress and completion events to build monitor observers.

pub mod client;
pub mod config;
pub mod error;
pub mod watcher;

pub use client::BuildStatusClient;
pub use config::WatchConfig;
pub use error::{WatchError, WatchResult};
pub use watcher::{RemoteBuildWatcher, WatchState};
