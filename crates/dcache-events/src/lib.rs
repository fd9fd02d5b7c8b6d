//! Observer fan-out for dcache.
//!
//! Loaders and the build watcher publish lifecycle, progress and error events
//! through an [`ObserverHub`]. Delivery is isolated per observer: one failing
//! or panicking observer never prevents the others from seeing an event, and
//! the failures come back aggregated in a [`FanoutError`].

pub mod error;
pub mod hub;
pub mod observer;

pub use error::{FanoutError, ObserverError, ObserverFailure, Result};
pub use hub::{BuildObservers, LoaderObservers, ObserverHub};
pub use observer::{BuildCompletion, BuildMonitorObserver, CacheLoaderObserver, TypeLoadObserver};
