use std::collections::BTreeSet;
use std::sync::Mutex;

use dcache_types::{RecordKey, TypeId};

/// Receives the changes a reload applies to the cache.
///
/// Updates are delivered per key, and only for watched keys. Inserts and
/// deletions are delivered in bulk.
pub trait ChangeNotifier: Send + Sync {
    fn is_watched(&self, key: &RecordKey) -> bool;

    fn notify_changed(&self, key: &RecordKey);

    fn records_inserted(&self, type_id: &TypeId, keys: &[RecordKey]);

    fn records_deleted(&self, type_id: &TypeId, keys: &[RecordKey]);
}

/// One notification captured by [`RecordingNotifier`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChangeEvent {
    Changed(String),
    Inserted(Vec<String>),
    Deleted(Vec<String>),
}

/// Notifier that keeps every notification it receives in order.
///
/// Watches every key unless restricted with [`watch_only`](Self::watch_only).
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    watched: Option<BTreeSet<String>>,
    events: Mutex<Vec<ChangeEvent>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Watch only the keys whose string forms are listed.
    pub fn watch_only<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            watched: Some(keys.into_iter().map(Into::into).collect()),
            events: Mutex::new(Vec::new()),
        }
    }

    /// Remove and return the events recorded so far.
    pub fn take(&self) -> Vec<ChangeEvent> {
        std::mem::take(&mut *self.events.lock().expect("notifier lock poisoned"))
    }

    fn record(&self, event: ChangeEvent) {
        self.events.lock().expect("notifier lock poisoned").push(event);
    }
}

fn texts(keys: &[RecordKey]) -> Vec<String> {
    keys.iter().map(ToString::to_string).collect()
}

impl ChangeNotifier for RecordingNotifier {
    fn is_watched(&self, key: &RecordKey) -> bool {
        self.watched
            .as_ref()
            .map_or(true, |keys| keys.contains(&key.to_string()))
    }

    fn notify_changed(&self, key: &RecordKey) {
        self.record(ChangeEvent::Changed(key.to_string()));
    }

    fn records_inserted(&self, _type_id: &TypeId, keys: &[RecordKey]) {
        self.record(ChangeEvent::Inserted(texts(keys)));
    }

    fn records_deleted(&self, _type_id: &TypeId, keys: &[RecordKey]) {
        self.record(ChangeEvent::Deleted(texts(keys)));
    }
}
