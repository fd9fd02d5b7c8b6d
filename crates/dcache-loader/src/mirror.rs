use std::fs::File;
use std::io::BufReader;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use dcache_pack::{ArchiveConfig, ArchiveWriter, PackResult, SnapshotArchive, SnapshotNegotiation};
use dcache_store::LocalSnapshotStore;
use dcache_types::VersionStamp;
use tracing::{info, warn};

use crate::download::{DownloadOutcome, DownloadSink, SnapshotDownloader};
use crate::error::LoadResult;

/// Downloader serving deltas from a second snapshot store acting as the
/// upstream mirror.
///
/// Each run compares the queued requests with the mirror's catalogue and
/// packages only the snapshots that are stale locally. The archive is built
/// on a background thread that checks for cancellation between sections.
pub struct MirrorDownloader {
    upstream: Arc<LocalSnapshotStore>,
    config: ArchiveConfig,
    queue: Mutex<Vec<VersionStamp>>,
    cancel: Mutex<Option<Arc<AtomicBool>>>,
}

impl MirrorDownloader {
    pub fn new(upstream: Arc<LocalSnapshotStore>, config: ArchiveConfig) -> Self {
        Self {
            upstream,
            config,
            queue: Mutex::new(Vec::new()),
            cancel: Mutex::new(None),
        }
    }
}

impl SnapshotDownloader for MirrorDownloader {
    fn clear(&self) {
        self.queue.lock().expect("download queue lock poisoned").clear();
    }

    fn add(&self, request: VersionStamp) {
        self.queue
            .lock()
            .expect("download queue lock poisoned")
            .push(request);
    }

    fn queued(&self) -> Vec<VersionStamp> {
        self.queue.lock().expect("download queue lock poisoned").clone()
    }

    fn run_async(&self, sink: DownloadSink) -> LoadResult<()> {
        let requests = self.queued();
        let cancel = Arc::new(AtomicBool::new(false));
        *self.cancel.lock().expect("download cancel lock poisoned") = Some(Arc::clone(&cancel));

        let upstream = Arc::clone(&self.upstream);
        let config = self.config.clone();
        thread::Builder::new()
            .name("dcache-mirror-download".into())
            .spawn(move || {
                let outcome = match package_stale(&upstream, &requests, &config, &cancel, &sink) {
                    Ok(Some(bytes)) => DownloadOutcome::completed(SnapshotArchive::from_bytes(bytes)),
                    Ok(None) => DownloadOutcome::cancelled(),
                    Err(e) => DownloadOutcome::failed(e.to_string()),
                };
                sink.complete(outcome);
            })?;
        Ok(())
    }

    fn cancel_async(&self) {
        if let Some(flag) = self.cancel.lock().expect("download cancel lock poisoned").as_ref() {
            flag.store(true, Ordering::SeqCst);
        }
    }
}

/// Build the archive of stale snapshots, or `None` if cancelled.
fn package_stale(
    upstream: &LocalSnapshotStore,
    requests: &[VersionStamp],
    config: &ArchiveConfig,
    cancel: &AtomicBool,
    sink: &DownloadSink,
) -> PackResult<Option<Vec<u8>>> {
    let server: Vec<VersionStamp> = match upstream.entry_versions() {
        Ok(versions) => versions
            .filter(|s| requests.iter().any(|r| r.type_id == s.type_id))
            .collect(),
        Err(e) => {
            warn!(error = %e, "mirror catalogue unavailable");
            Vec::new()
        }
    };
    let stale = SnapshotNegotiation::stale(requests, &server);

    let mut archive = ArchiveWriter::new(Vec::new(), config.clone())?;
    let total = stale.len().max(1);
    for (i, stamp) in stale.iter().enumerate() {
        if cancel.load(Ordering::SeqCst) {
            return Ok(None);
        }
        sink.progress((i * 100 / total) as u32);
        match File::open(upstream.entry_path(&stamp.type_id)) {
            Ok(file) => {
                archive.add_section(stamp, BufReader::new(file))?;
            }
            Err(e) => warn!(type_id = %stamp.type_id, error = %e, "mirror snapshot vanished"),
        }
    }
    if cancel.load(Ordering::SeqCst) {
        return Ok(None);
    }
    sink.progress(100);
    info!(requested = requests.len(), sent = archive.sections(), "mirror download packaged");
    Ok(Some(archive.finish()?))
}
