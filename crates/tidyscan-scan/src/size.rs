//! Exact and sampled size computation.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use jwalk::Parallelism;
use rand::Rng;
use rayon::prelude::*;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use tidyscan_core::{ScanConfiguration, ScanError};

use crate::walk::{WalkCounters, configured_walker};

/// Upper bound on the number of chunks summed concurrently.
pub const MAX_CHUNKS: usize = 8;

/// Smallest chunk worth handing to its own task.
pub const MIN_CHUNK_SIZE: usize = 100;

/// Size of a single file, 0 when it cannot be read.
pub fn file_size(path: &Path) -> u64 {
    fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

/// Computes the byte size of a file or directory subtree.
///
/// [`exact_size`](Self::exact_size) lists every file and sums them in at most
/// [`MAX_CHUNKS`] parallel chunks. [`estimate_size`](Self::estimate_size)
/// makes a single pass, sizes a random sample and extrapolates; it is meant
/// for quick previews only, since small trees can easily end up with no
/// sample at all.
#[derive(Debug, Clone)]
pub struct SizeComputer {
    scope: Arc<ScanConfiguration>,
    max_chunks: usize,
    min_chunk_size: usize,
    cancel: CancellationToken,
}

impl SizeComputer {
    /// Size computer that skips hidden entries and excludes nothing.
    pub fn new() -> Self {
        let scope = ScanConfiguration::builder()
            .include_hidden(false)
            .build()
            .unwrap_or_default();
        Self::from_config(scope)
    }

    /// Take the hidden-file policy and excluded prefixes from a scan configuration.
    pub fn from_config(config: ScanConfiguration) -> Self {
        Self {
            scope: Arc::new(config),
            max_chunks: MAX_CHUNKS,
            min_chunk_size: MIN_CHUNK_SIZE,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_max_chunks(mut self, max_chunks: usize) -> Self {
        self.max_chunks = max_chunks.max(1);
        self
    }

    pub fn with_min_chunk_size(mut self, min_chunk_size: usize) -> Self {
        self.min_chunk_size = min_chunk_size.max(1);
        self
    }

    /// Stop enumerating and summing once `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Number of paths per chunk for a list of `total` files.
    ///
    /// Never below the minimum chunk size, and large enough that no more
    /// than `max_chunks` chunks are produced.
    pub fn chunk_size(&self, total: usize) -> usize {
        total.div_ceil(self.max_chunks).max(self.min_chunk_size)
    }

    /// Exact total size of `path`.
    ///
    /// A file yields its own size, a missing path yields 0.
    pub fn exact_size(&self, path: &Path) -> u64 {
        let Ok(metadata) = fs::metadata(path) else {
            return 0;
        };
        if !metadata.is_dir() {
            return metadata.len();
        }

        let files = self.list_files(path);
        let total = self.sum_sizes(&files);
        debug!(path = %path.display(), files = files.len(), total, "Computed exact size");
        total
    }

    /// Sum the sizes of `files` concurrently, one task per chunk.
    pub fn sum_sizes(&self, files: &[PathBuf]) -> u64 {
        if files.is_empty() {
            return 0;
        }

        files
            .par_chunks(self.chunk_size(files.len()))
            .map(|chunk| {
                chunk
                    .iter()
                    .take_while(|_| !self.cancel.is_cancelled())
                    .map(|file| file_size(file))
                    .sum::<u64>()
            })
            .sum()
    }

    /// Every regular file under `root`, in enumeration order.
    pub fn list_files(&self, root: &Path) -> Vec<PathBuf> {
        if root.is_file() {
            return vec![root.to_path_buf()];
        }

        let counters = Arc::new(WalkCounters::default());
        let parallelism = Parallelism::RayonDefaultPool {
            busy_timeout: std::time::Duration::from_millis(100),
        };

        configured_walker(root, &self.scope, parallelism, &self.cancel, &counters)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.path())
            .collect()
    }

    /// Estimate the size of `path` by sampling each file with probability
    /// `sample_rate`.
    pub fn estimate_size(&self, path: &Path, sample_rate: f64) -> Result<u64, ScanError> {
        self.estimate_size_with_rng(path, sample_rate, &mut rand::thread_rng())
    }

    /// [`estimate_size`](Self::estimate_size) with a caller-supplied RNG.
    pub fn estimate_size_with_rng<R>(
        &self,
        path: &Path,
        sample_rate: f64,
        rng: &mut R,
    ) -> Result<u64, ScanError>
    where
        R: Rng + ?Sized,
    {
        if !(sample_rate > 0.0 && sample_rate <= 1.0) {
            return Err(ScanError::invalid_config(format!(
                "sample rate must be in (0, 1], got {sample_rate}"
            )));
        }

        let Ok(metadata) = fs::metadata(path) else {
            return Ok(0);
        };
        if !metadata.is_dir() {
            return Ok(if rng.gen_bool(sample_rate) {
                metadata.len()
            } else {
                0
            });
        }

        let counters = Arc::new(WalkCounters::default());
        let walker =
            configured_walker(path, &self.scope, Parallelism::Serial, &self.cancel, &counters);

        let mut total_files: u64 = 0;
        let mut sampled_files: u64 = 0;
        let mut sampled_bytes: u64 = 0;

        for entry in walker.into_iter().filter_map(Result::ok) {
            if !entry.file_type().is_file() {
                continue;
            }
            total_files += 1;
            if rng.gen_bool(sample_rate) {
                sampled_files += 1;
                sampled_bytes += entry.metadata().map(|m| m.len()).unwrap_or(0);
            }
        }

        if sampled_files == 0 {
            return Ok(0);
        }

        // Integer form of (sampled_bytes / sampled_files) * total_files, so a
        // full sample reproduces the exact sum without float rounding.
        let estimate =
            u128::from(sampled_bytes) * u128::from(total_files) / u128::from(sampled_files);
        debug!(
            path = %path.display(),
            total_files,
            sampled_files,
            estimate = estimate as u64,
            "Estimated size from sample"
        );
        Ok(u64::try_from(estimate).unwrap_or(u64::MAX))
    }
}

impl Default for SizeComputer {
    fn default() -> Self {
        Self::new()
    }
}
