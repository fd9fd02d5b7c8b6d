use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::Arc;

use dcache_events::{CacheLoaderObserver, LoaderObservers};
use dcache_pack::SnapshotArchive;
use dcache_types::VersionStamp;
use tracing::warn;

use crate::error::LoadResult;

/// Result of one combined download operation.
#[derive(Debug, Default)]
pub struct DownloadOutcome {
    pub package: Option<SnapshotArchive>,
    pub error: Option<String>,
    pub cancelled: bool,
}

impl DownloadOutcome {
    pub fn completed(package: SnapshotArchive) -> Self {
        Self {
            package: Some(package),
            ..Default::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn cancelled() -> Self {
        Self {
            cancelled: true,
            ..Default::default()
        }
    }
}

/// Completion side of a download: forwards progress and signals the gate
/// exactly once.
pub struct DownloadSink {
    done: SyncSender<DownloadOutcome>,
    observers: Arc<LoaderObservers>,
}

impl DownloadSink {
    pub fn progress(&self, percent: u32) {
        if let Err(e) = self.observers.on_download_progress(percent.min(100)) {
            warn!(percent, error = %e, "download progress notification failed");
        }
    }

    /// Signal completion. Dropping the sink without completing reports the
    /// download as failed.
    pub fn complete(self, outcome: DownloadOutcome) {
        // The gate may already be gone if the loader was disposed.
        let _ = self.done.send(outcome);
    }
}

/// One-shot gate the loader thread blocks on until the download completes.
pub struct DownloadGate {
    done: Receiver<DownloadOutcome>,
}

impl DownloadGate {
    pub fn wait(self) -> DownloadOutcome {
        self.done
            .recv()
            .unwrap_or_else(|_| DownloadOutcome::failed("download abandoned without completing"))
    }
}

/// A connected sink and gate.
pub fn download_channel(observers: Arc<LoaderObservers>) -> (DownloadSink, DownloadGate) {
    let (tx, rx) = mpsc::sync_channel(1);
    (
        DownloadSink {
            done: tx,
            observers,
        },
        DownloadGate { done: rx },
    )
}

/// Fetches the snapshots a bootstrap load is missing as one archive.
///
/// Requests carry the version held locally, or [`Timestamp::MIN`] when the
/// type has no local snapshot; the downloader returns only what is newer.
///
/// [`Timestamp::MIN`]: dcache_types::Timestamp::MIN
pub trait SnapshotDownloader: Send + Sync {
    /// Drop every queued request.
    fn clear(&self);

    fn add(&self, request: VersionStamp);

    fn add_range(&self, requests: Vec<VersionStamp>) {
        for request in requests {
            self.add(request);
        }
    }

    /// Requests currently queued.
    fn queued(&self) -> Vec<VersionStamp>;

    /// Start the download of every queued request. Completion, including
    /// failure, is signalled through `sink`.
    fn run_async(&self, sink: DownloadSink) -> LoadResult<()>;

    /// Ask an in-flight download to stop. It completes as cancelled.
    fn cancel_async(&self);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn gate_receives_outcome_from_another_thread() {
        let (sink, gate) = download_channel(Arc::new(LoaderObservers::new()));
        let worker = thread::spawn(move || {
            sink.progress(50);
            sink.complete(DownloadOutcome::completed(SnapshotArchive::from_bytes(Vec::new())));
        });
        let outcome = gate.wait();
        worker.join().unwrap();
        assert!(outcome.package.is_some());
        assert!(outcome.error.is_none());
    }

    #[test]
    fn dropped_sink_fails_the_gate() {
        let (sink, gate) = download_channel(Arc::new(LoaderObservers::new()));
        drop(sink);
        let outcome = gate.wait();
        assert!(outcome.package.is_none());
        assert!(outcome.error.is_some());
    }
}
