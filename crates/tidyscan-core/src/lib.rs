//! Core types and shared state for tidyscan.
//!
//! This crate holds everything the scan and analysis crates coordinate
//! through: the immutable [`ScanConfiguration`], the lock-guarded
//! [`ResultAccumulator`] and [`ProgressTracker`], and the
//! [`UpdateThrottle`] that batches observer notifications.

mod accumulator;
mod config;
mod entry;
mod error;
mod progress;
mod throttle;

pub use accumulator::{AccumulatedResults, AccumulatorSnapshot, ResultAccumulator};
pub use config::{LARGE_FILE_THRESHOLD, ScanConfiguration, ScanConfigurationBuilder};
pub use entry::EntryMetadata;
pub use error::ScanError;
pub use progress::{ProgressSnapshot, ProgressTracker};
pub use throttle::{
    DeliveryContext, DeliveryThread, PendingUpdate, ProgressCallback, ProgressNotifier,
    QueuedDelivery, UpdateReceiver, UpdateThrottle, update_queue,
};
