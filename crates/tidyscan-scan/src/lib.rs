//! File system scanning engine for tidyscan.
//!
//! This crate walks directory trees in parallel using jwalk and computes
//! aggregate sizes.
//!
//! # Overview
//!
//! - [`DirectoryScanner`] walks one or more roots, one worker per root,
//!   prunes excluded subtrees, applies the size floor and hidden-file policy
//!   and feeds every surviving file to a caller-supplied transform.
//! - [`SizeComputer`] computes the exact size of a tree by summing its files
//!   in parallel chunks, or estimates it from a random sample.
//!
//! # Example
//!
//! ```rust,no_run
//! use tidyscan_scan::{DirectoryScanner, ScanConfiguration};
//!
//! let scanner = DirectoryScanner::new(ScanConfiguration::large_file_scan());
//! let output = scanner
//!     .scan(["/home/user"], |path, meta| Some((path.to_path_buf(), meta.size)))
//!     .unwrap();
//!
//! println!("{} large files, {} bytes", output.items.len(), output.total_size);
//! ```
//!
//! # Progress Monitoring
//!
//! Attach a [`ProgressNotifier`] to receive throttled progress snapshots on
//! a delivery thread:
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tidyscan_scan::{
//!     DeliveryThread, DirectoryScanner, ProgressNotifier, ScanConfiguration, UpdateThrottle,
//! };
//!
//! let delivery = DeliveryThread::spawn("progress").unwrap();
//! let throttle = Arc::new(UpdateThrottle::new(UpdateThrottle::DEFAULT_INTERVAL, delivery));
//! let notifier = ProgressNotifier::new(throttle, |snapshot| {
//!     println!("{:.0}% {}", snapshot.fraction() * 100.0, snapshot.current_path.display());
//! });
//!
//! let scanner = DirectoryScanner::new(ScanConfiguration::junk_scan()).with_notifier(notifier);
//! let output = scanner.scan_files(["/tmp"]).unwrap();
//! ```

mod scanner;
mod size;
mod walk;

pub use scanner::{DirectoryScanner, ScanOutput, ScannedFile};
pub use size::{MAX_CHUNKS, MIN_CHUNK_SIZE, SizeComputer, file_size};

// Re-export core types for convenience
pub use tidyscan_core::{
    DeliveryThread, EntryMetadata, ProgressNotifier, ProgressSnapshot, ProgressTracker,
    ResultAccumulator, ScanConfiguration, ScanError, UpdateThrottle,
};
