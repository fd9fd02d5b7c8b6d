use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use dcache_events::{BuildCompletion, BuildMonitorObserver, BuildObservers, ObserverError};
use dcache_types::{BuildExecutionResult, BuildExecutionState};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::client::BuildStatusClient;
use crate::config::WatchConfig;
use crate::error::{WatchError, WatchResult};

const NOT_FOUND: &str = "build execution not found";
const ABORTED: &str = "build execution aborted";

/// Whether the watcher currently holds a lease.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WatchState {
    Idle,
    Listening,
}

#[derive(Clone, Copy, Debug)]
struct Lease {
    build: Uuid,
    /// `None` when the lifetime reaches past what `Instant` can represent.
    expires_at: Option<Instant>,
    /// Set once the first status query of this lease has succeeded.
    started: bool,
}

impl Lease {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

struct Worker {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Polls a remote build execution and republishes its progress to
/// [`BuildMonitorObserver`]s.
///
/// At most one build is watched at a time. [`listen`](Self::listen) takes a
/// lease on a build for a limited lifetime; each [`tick`](Self::tick) either
/// expires the lease or queries the remote status and publishes what changed.
/// A failed status query is reported and retried on the next tick. Terminal
/// remote states complete the watch and release the lease.
pub struct RemoteBuildWatcher {
    client: Arc<dyn BuildStatusClient>,
    observers: Arc<BuildObservers>,
    config: WatchConfig,
    lease: Mutex<Option<Lease>>,
    worker: Mutex<Option<Worker>>,
}

impl RemoteBuildWatcher {
    pub fn new(
        client: Arc<dyn BuildStatusClient>,
        observers: Arc<BuildObservers>,
        config: WatchConfig,
    ) -> Self {
        Self {
            client,
            observers,
            config,
            lease: Mutex::new(None),
            worker: Mutex::new(None),
        }
    }

    /// Watch `build` for at most `lifetime`, replacing any current lease.
    /// `Duration::MAX` watches until the build completes or the listen is
    /// aborted.
    pub fn listen(&self, build: Uuid, lifetime: Duration) {
        let lease = Lease {
            build,
            expires_at: Instant::now().checked_add(lifetime),
            started: false,
        };
        let previous = self.lease.lock().expect("lease lock poisoned").replace(lease);
        debug!(%build, ?lifetime, replaced = ?previous.map(|l| l.build), "listening to build");
    }

    /// Stop watching. An unexpired lease completes as cancelled.
    pub fn abort_listen(&self) {
        let lease = self.lease.lock().expect("lease lock poisoned").take();
        if let Some(lease) = lease {
            if !lease.is_expired(Instant::now()) {
                self.complete(lease.build, &BuildCompletion::cancelled());
            }
            debug!(build = %lease.build, "listen aborted");
        }
    }

    pub fn state(&self) -> WatchState {
        match *self.lease.lock().expect("lease lock poisoned") {
            Some(_) => WatchState::Listening,
            None => WatchState::Idle,
        }
    }

    /// The build currently leased, if any.
    pub fn current_build(&self) -> Option<Uuid> {
        self.lease
            .lock()
            .expect("lease lock poisoned")
            .map(|l| l.build)
    }

    /// Run one poll step and return the resulting state.
    pub async fn tick(&self) -> WatchState {
        let lease = *self.lease.lock().expect("lease lock poisoned");
        let Some(lease) = lease else {
            return WatchState::Idle;
        };

        if lease.is_expired(Instant::now()) {
            self.release(lease.build);
            debug!(build = %lease.build, "lease expired");
            self.complete(lease.build, &BuildCompletion::cancelled());
            tokio::time::sleep(self.config.expiry_backoff).await;
            return WatchState::Idle;
        }

        let status = self.client.execution_status(lease.build).await;
        if !self.holds(lease.build) {
            debug!(build = %lease.build, "lease replaced during status check, result dropped");
            return self.state();
        }
        match status {
            Ok(status) => self.apply(lease, status),
            Err(e) => {
                let error = e.to_string();
                debug!(build = %lease.build, error = %error, "status check failed");
                report(self.observers.on_check_error(lease.build, &error));
                WatchState::Listening
            }
        }
    }

    fn apply(&self, lease: Lease, status: BuildExecutionResult) -> WatchState {
        let build = lease.build;
        if !lease.started && self.mark_started(build) {
            report(self.observers.on_start(build));
        }
        if let Some(message) = status.message.as_deref().filter(|m| !m.is_empty()) {
            report(self.observers.on_message_changed(build, message));
        }
        let error = status.error_message.filter(|e| !e.is_empty());

        let completion = match status.state {
            BuildExecutionState::Finalized => match error {
                None => BuildCompletion::succeeded(),
                Some(e) => BuildCompletion::failed(e),
            },
            BuildExecutionState::Aborted => {
                BuildCompletion::failed(error.unwrap_or_else(|| ABORTED.to_string()))
            }
            BuildExecutionState::NoExists => BuildCompletion::failed(NOT_FOUND),
            BuildExecutionState::Busy | BuildExecutionState::Queued | BuildExecutionState::Running => {
                report(self.observers.on_progress_changed(
                    build,
                    status.total_progress,
                    status.current_progress,
                ));
                return WatchState::Listening;
            }
        };

        self.release(build);
        debug!(%build, state = %status.state, success = completion.success, "build watch completed");
        self.complete(build, &completion);
        WatchState::Idle
    }

    /// Spawn the polling worker on the current tokio runtime. Does nothing if
    /// a worker is already running.
    pub fn start(self: &Arc<Self>) -> WatchResult<()> {
        let mut worker = self.worker.lock().expect("worker lock poisoned");
        if worker.as_ref().is_some_and(|w| !w.handle.is_finished()) {
            return Ok(());
        }
        let runtime = Handle::try_current().map_err(|_| WatchError::NoRuntime)?;
        let (shutdown, signal) = watch::channel(false);
        let handle = runtime.spawn(Arc::clone(self).run(signal));
        *worker = Some(Worker { shutdown, handle });
        debug!(poll_interval = ?self.config.poll_interval, "build watcher started");
        Ok(())
    }

    /// Signal the worker to exit after its current tick and wait for it.
    /// Does nothing if no worker is running.
    pub async fn stop(&self) -> WatchResult<()> {
        let worker = self.worker.lock().expect("worker lock poisoned").take();
        let Some(worker) = worker else {
            return Ok(());
        };
        // The worker may already have exited and dropped its receiver.
        let _ = worker.shutdown.send(true);
        worker
            .handle
            .await
            .map_err(|e| WatchError::Worker(e.to_string()))
    }

    pub fn is_running(&self) -> bool {
        self.worker
            .lock()
            .expect("worker lock poisoned")
            .as_ref()
            .is_some_and(|w| !w.handle.is_finished())
    }

    async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = tokio::time::sleep(self.config.poll_interval) => {
                    self.tick().await;
                }
            }
        }
        debug!("build watcher stopped");
    }

    fn holds(&self, build: Uuid) -> bool {
        self.lease
            .lock()
            .expect("lease lock poisoned")
            .is_some_and(|l| l.build == build)
    }

    /// Clear the lease if it still belongs to `build`.
    fn release(&self, build: Uuid) {
        let mut lease = self.lease.lock().expect("lease lock poisoned");
        if lease.is_some_and(|l| l.build == build) {
            *lease = None;
        }
    }

    /// Flag the first successful check of `build`. Returns `false` if the
    /// lease moved on in the meantime.
    fn mark_started(&self, build: Uuid) -> bool {
        match self.lease.lock().expect("lease lock poisoned").as_mut() {
            Some(lease) if lease.build == build && !lease.started => {
                lease.started = true;
                true
            }
            _ => false,
        }
    }

    fn complete(&self, build: Uuid, completion: &BuildCompletion) {
        report(self.observers.on_completed(build, completion));
    }
}

fn report(result: Result<(), ObserverError>) {
    if let Err(e) = result {
        warn!(error = %e, "build observer failed");
    }
}
