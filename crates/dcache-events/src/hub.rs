use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

use dcache_types::TypeId;
use tracing::warn;
use uuid::Uuid;

use crate::error::{FanoutError, ObserverError, ObserverFailure, Result};
use crate::observer::{BuildCompletion, BuildMonitorObserver, CacheLoaderObserver, TypeLoadObserver};

/// Thread-safe multicast of events to registered observers.
///
/// A single mutex guards the observer list and is held only to mutate it or
/// to take a snapshot; observers are always called with the lock released.
/// Each event reaches every observer in the snapshot. Failures, including
/// panics, are collected and returned together as a [`FanoutError`].
///
/// The hub implements the observer trait it fans out, so hubs nest.
pub struct ObserverHub<O: ?Sized> {
    observers: Mutex<Vec<Arc<O>>>,
}

impl<O: ?Sized> Default for ObserverHub<O> {
    fn default() -> Self {
        Self {
            observers: Mutex::new(Vec::new()),
        }
    }
}

impl<O: ?Sized> ObserverHub<O> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `observer`. The same observer may be added more than once.
    pub fn add(&self, observer: Arc<O>) -> &Self {
        self.observers
            .lock()
            .expect("observer hub lock poisoned")
            .push(observer);
        self
    }

    /// Remove the first registration of `observer`. Returns `false` if it was
    /// not registered.
    pub fn remove(&self, observer: &Arc<O>) -> bool {
        let mut observers = self.observers.lock().expect("observer hub lock poisoned");
        let target = Arc::as_ptr(observer).cast::<()>();
        match observers
            .iter()
            .position(|o| Arc::as_ptr(o).cast::<()>() == target)
        {
            Some(pos) => {
                observers.remove(pos);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.observers.lock().expect("observer hub lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver one event to every observer.
    pub fn notify<F>(&self, event: &'static str, mut deliver: F) -> Result<()>
    where
        F: FnMut(&O) -> std::result::Result<(), ObserverError>,
    {
        let snapshot: Vec<Arc<O>> = self
            .observers
            .lock()
            .expect("observer hub lock poisoned")
            .clone();

        let mut failures = Vec::new();
        for (index, observer) in snapshot.iter().enumerate() {
            let error = match panic::catch_unwind(AssertUnwindSafe(|| deliver(&**observer))) {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => e,
                Err(payload) => ObserverError::Panicked(panic_message(&*payload)),
            };
            warn!(event = event, index = index, error = %error, "observer failed");
            failures.push(ObserverFailure { index, error });
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(FanoutError { event, failures })
        }
    }
}

impl<O: ?Sized> fmt::Debug for ObserverHub<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverHub")
            .field("observers", &self.len())
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Hub of cache loader observers.
pub type LoaderObservers = ObserverHub<dyn CacheLoaderObserver>;

/// Hub of build monitor observers.
pub type BuildObservers = ObserverHub<dyn BuildMonitorObserver>;

impl CacheLoaderObserver for ObserverHub<dyn CacheLoaderObserver> {
    fn on_load_started(&self) -> std::result::Result<(), ObserverError> {
        Ok(self.notify("load_started", |o| o.on_load_started())?)
    }

    fn on_load_finished(&self) -> std::result::Result<(), ObserverError> {
        Ok(self.notify("load_finished", |o| o.on_load_finished())?)
    }

    fn on_progress(&self, total: u32, current: u32) -> std::result::Result<(), ObserverError> {
        Ok(self.notify("progress", |o| o.on_progress(total, current))?)
    }

    fn on_load_error(&self, type_id: &TypeId, message: &str) -> std::result::Result<(), ObserverError> {
        Ok(self.notify("load_error", |o| o.on_load_error(type_id, message))?)
    }

    fn on_download_progress(&self, percent: u32) -> std::result::Result<(), ObserverError> {
        Ok(self.notify("download_progress", |o| o.on_download_progress(percent))?)
    }

    fn type_load_observer(&self) -> Option<&dyn TypeLoadObserver> {
        Some(self)
    }
}

impl TypeLoadObserver for ObserverHub<dyn CacheLoaderObserver> {
    fn on_begin_type(&self, type_id: &TypeId) -> std::result::Result<(), ObserverError> {
        Ok(self.notify("begin_type", |o| match o.type_load_observer() {
            Some(t) => t.on_begin_type(type_id),
            None => Ok(()),
        })?)
    }

    fn on_end_type(&self, type_id: &TypeId) -> std::result::Result<(), ObserverError> {
        Ok(self.notify("end_type", |o| match o.type_load_observer() {
            Some(t) => t.on_end_type(type_id),
            None => Ok(()),
        })?)
    }
}

impl BuildMonitorObserver for ObserverHub<dyn BuildMonitorObserver> {
    fn on_start(&self, build: Uuid) -> std::result::Result<(), ObserverError> {
        Ok(self.notify("build_start", |o| o.on_start(build))?)
    }

    fn on_message_changed(&self, build: Uuid, message: &str) -> std::result::Result<(), ObserverError> {
        Ok(self.notify("build_message", |o| o.on_message_changed(build, message))?)
    }

    fn on_progress_changed(
        &self,
        build: Uuid,
        total: u32,
        current: u32,
    ) -> std::result::Result<(), ObserverError> {
        Ok(self.notify("build_progress", |o| o.on_progress_changed(build, total, current))?)
    }

    fn on_completed(
        &self,
        build: Uuid,
        completion: &BuildCompletion,
    ) -> std::result::Result<(), ObserverError> {
        Ok(self.notify("build_completed", |o| o.on_completed(build, completion))?)
    }

    fn on_check_error(&self, build: Uuid, error: &str) -> std::result::Result<(), ObserverError> {
        Ok(self.notify("build_check_error", |o| o.on_check_error(build, error))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counting {
        started: AtomicUsize,
        progress: Mutex<Vec<(u32, u32)>>,
    }

    impl CacheLoaderObserver for Counting {
        fn on_load_started(&self) -> std::result::Result<(), ObserverError> {
            self.started.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn on_progress(&self, total: u32, current: u32) -> std::result::Result<(), ObserverError> {
            self.progress.lock().unwrap().push((total, current));
            Ok(())
        }
    }

    struct Failing;

    impl CacheLoaderObserver for Failing {
        fn on_load_started(&self) -> std::result::Result<(), ObserverError> {
            Err(ObserverError::Failed("nope".into()))
        }
    }

    struct Panicking;

    impl CacheLoaderObserver for Panicking {
        fn on_load_started(&self) -> std::result::Result<(), ObserverError> {
            panic!("observer blew up")
        }
    }

    #[derive(Default)]
    struct TypeTracking {
        begun: Mutex<Vec<String>>,
    }

    impl CacheLoaderObserver for TypeTracking {
        fn type_load_observer(&self) -> Option<&dyn TypeLoadObserver> {
            Some(self)
        }
    }

    impl TypeLoadObserver for TypeTracking {
        fn on_begin_type(&self, type_id: &TypeId) -> std::result::Result<(), ObserverError> {
            self.begun.lock().unwrap().push(type_id.to_string());
            Ok(())
        }

        fn on_end_type(&self, _type_id: &TypeId) -> std::result::Result<(), ObserverError> {
            Ok(())
        }
    }

    #[test]
    fn every_observer_is_notified() {
        let hub = LoaderObservers::new();
        let a = Arc::new(Counting::default());
        let b = Arc::new(Counting::default());
        hub.add(a.clone()).add(b.clone());
        hub.on_load_started().unwrap();
        hub.on_progress(100, 50).unwrap();
        assert_eq!(a.started.load(Ordering::SeqCst), 1);
        assert_eq!(b.started.load(Ordering::SeqCst), 1);
        assert_eq!(*b.progress.lock().unwrap(), vec![(100, 50)]);
    }

    #[test]
    fn failures_are_isolated_and_aggregated() {
        let hub = LoaderObservers::new();
        let last = Arc::new(Counting::default());
        hub.add(Arc::new(Failing))
            .add(Arc::new(Panicking))
            .add(last.clone());

        let err = hub.notify("load_started", |o| o.on_load_started()).unwrap_err();
        assert_eq!(err.event, "load_started");
        assert_eq!(err.failures.len(), 2);
        assert_eq!(err.failures[0].index, 0);
        assert!(matches!(err.failures[1].error, ObserverError::Panicked(ref m) if m == "observer blew up"));
        assert_eq!(last.started.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn nested_hub_surfaces_fanout_error() {
        let inner = Arc::new(LoaderObservers::new());
        inner.add(Arc::new(Failing));
        let outer = LoaderObservers::new();
        outer.add(inner);
        let err = outer.on_load_started().unwrap_err();
        assert!(matches!(err, ObserverError::Fanout(_)));
    }

    #[test]
    fn remove_takes_first_match_only() {
        let hub = LoaderObservers::new();
        let a: Arc<dyn CacheLoaderObserver> = Arc::new(Counting::default());
        let b: Arc<dyn CacheLoaderObserver> = Arc::new(Counting::default());
        hub.add(a.clone()).add(b.clone()).add(a.clone());
        assert!(hub.remove(&a));
        assert_eq!(hub.len(), 2);
        assert!(hub.remove(&a));
        assert!(!hub.remove(&a));
        assert_eq!(hub.len(), 1);
    }

    #[test]
    fn capability_events_skip_plain_observers() {
        let hub = LoaderObservers::new();
        let plain = Arc::new(Counting::default());
        let tracking = Arc::new(TypeTracking::default());
        hub.add(plain).add(tracking.clone());
        hub.on_begin_type(&TypeId::new("sales.Order")).unwrap();
        assert_eq!(*tracking.begun.lock().unwrap(), vec!["sales.Order".to_string()]);
    }

    #[test]
    fn observer_may_mutate_hub_during_notify() {
        struct SelfExtending {
            hub: Arc<LoaderObservers>,
        }
        impl CacheLoaderObserver for SelfExtending {
            fn on_load_finished(&self) -> std::result::Result<(), ObserverError> {
                self.hub.add(Arc::new(Counting::default()));
                Ok(())
            }
        }
        let hub = Arc::new(LoaderObservers::new());
        hub.add(Arc::new(SelfExtending { hub: hub.clone() }));
        hub.on_load_finished().unwrap();
        assert_eq!(hub.len(), 2);
    }

    #[test]
    fn build_events_fan_out() {
        #[derive(Default)]
        struct Completions(Mutex<Vec<BuildCompletion>>);
        impl BuildMonitorObserver for Completions {
            fn on_completed(
                &self,
                _build: Uuid,
                completion: &BuildCompletion,
            ) -> std::result::Result<(), ObserverError> {
                self.0.lock().unwrap().push(completion.clone());
                Ok(())
            }
        }
        let hub = BuildObservers::new();
        let seen = Arc::new(Completions::default());
        hub.add(seen.clone());
        hub.on_start(Uuid::nil()).unwrap();
        hub.on_completed(Uuid::nil(), &BuildCompletion::cancelled()).unwrap();
        assert_eq!(*seen.0.lock().unwrap(), vec![BuildCompletion::cancelled()]);
    }
}
