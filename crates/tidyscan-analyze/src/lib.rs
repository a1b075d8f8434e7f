//! Content hashing and duplicate detection for tidyscan.
//!
//! - [`HashComputer`] digests many files with MD5 while keeping at most a
//!   configured number of reads in flight. Unreadable files are omitted.
//! - [`DuplicateFinder`] groups scan output by size, hashes only the size
//!   collisions and reports groups of identical files.
//!
//! # Hashing
//!
//! ```rust,no_run
//! use tidyscan_analyze::compute_hashes;
//!
//! # async fn run() -> Result<(), tidyscan_analyze::ScanError> {
//! let hashes = compute_hashes(vec!["/etc/hosts".into(), "/etc/passwd".into()], 4).await?;
//! for (path, digest) in &hashes {
//!     println!("{digest}  {}", path.display());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Duplicate Detection
//!
//! ```rust,no_run
//! use tidyscan_analyze::DuplicateFinder;
//! use tidyscan_scan::{DirectoryScanner, ScanConfiguration};
//!
//! # async fn run() -> Result<(), tidyscan_analyze::ScanError> {
//! let output = DirectoryScanner::new(ScanConfiguration::junk_scan()).scan_files(["/data"])?;
//! let report = DuplicateFinder::new()
//!     .find_duplicates(output.items.into_iter().map(|f| (f.path, f.size)))
//!     .await?;
//!
//! println!("Found {} duplicate groups", report.group_count);
//! println!("Wasted space: {} bytes", report.total_wasted_space);
//! # Ok(())
//! # }
//! ```

mod duplicates;
mod hash;

pub use duplicates::{DuplicateConfig, DuplicateFinder, DuplicateGroup, DuplicateReport};
pub use hash::{
    ContentDigest, ContentSource, FsContent, HashComputer, HashResult, compute_hashes,
};

// Re-export core types
pub use tidyscan_core::{ProgressNotifier, ProgressSnapshot, ScanError};
