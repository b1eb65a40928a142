//! Severity engine modules
//!
//! Contains the hysteresis classifier, the watcher loop and the helper that
//! ties configuration, sysfs and severity state together.

mod helper;
mod severity;
mod watcher;

pub use helper::{ThermalHelper, ThrottlingNotifier};
pub use severity::{classify, severity_from_thresholds, SeverityPair};
pub use watcher::{
    poll_interval, EventSource, KernelEventSource, ThermalWatcher, WaitOutcome, Waker,
    WatcherState,
};
