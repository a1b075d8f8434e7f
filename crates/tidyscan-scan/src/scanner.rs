//! JWalk-based parallel directory scanner.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant, SystemTime};

use jwalk::Parallelism;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use tidyscan_core::{
    EntryMetadata, ProgressNotifier, ProgressTracker, ResultAccumulator, ScanConfiguration,
    ScanError,
};

use crate::walk::{WalkCounters, configured_walker};

/// Items a worker buffers locally before merging into the shared accumulator.
const MERGE_BATCH_SIZE: usize = 1_024;

/// Everything a scan produced.
#[derive(Debug, Clone)]
pub struct ScanOutput<T> {
    /// Values returned by the transform, in arrival order.
    pub items: Vec<T>,
    /// Sum of the sizes of the files behind `items`.
    pub total_size: u64,
    /// Regular files examined, whether or not they became items.
    pub processed_count: u64,
    /// Directory entries enumerated after pruning.
    pub entries_visited: u64,
    /// Entries skipped because they could not be read.
    pub skipped_entries: u64,
    /// Wall-clock time of the scan.
    pub duration: Duration,
    /// Whether the scan stopped early on cancellation.
    pub cancelled: bool,
}

/// Ready-made scan item carrying the basics of a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScannedFile {
    pub path: PathBuf,
    pub size: u64,
    pub modified: Option<SystemTime>,
}

/// Shared state for one scan invocation.
struct ScanState<'a, T> {
    accumulator: ResultAccumulator<T>,
    progress: ProgressTracker,
    counters: Arc<WalkCounters>,
    files_seen: AtomicU64,
    notifier: Option<&'a ProgressNotifier>,
    notify_interval: u64,
}

impl<T> ScanState<'_, T> {
    /// Count a processed file and notify the observer every `notify_interval` files.
    fn file_seen(&self, path: &Path) {
        let seen = self.files_seen.fetch_add(1, Ordering::Relaxed) + 1;
        if let Some(notifier) = self.notifier {
            if seen % self.notify_interval == 0 {
                self.progress.set_current_path(path);
                notifier.notify(self.progress.snapshot());
            }
        }
    }
}

/// Local, lock-free buffer of one root worker.
struct RootBatch<T> {
    items: Vec<T>,
    size: u64,
    processed: u64,
}

impl<T> RootBatch<T> {
    fn new() -> Self {
        Self {
            items: Vec::new(),
            size: 0,
            processed: 0,
        }
    }

    fn flush_into(&mut self, accumulator: &ResultAccumulator<T>) {
        let items = std::mem::take(&mut self.items);
        accumulator.merge(items, self.size, self.processed);
        self.size = 0;
        self.processed = 0;
    }
}

/// Walks roots in parallel and turns surviving files into caller-defined items.
///
/// Each root is walked by one worker; at most `max_concurrency` roots are
/// walked at the same time. Within a root, entries come out in jwalk's
/// serial enumeration order.
#[derive(Debug, Clone)]
pub struct DirectoryScanner {
    config: Arc<ScanConfiguration>,
    notifier: Option<ProgressNotifier>,
    cancel: CancellationToken,
}

impl DirectoryScanner {
    /// Create a new scanner.
    pub fn new(config: ScanConfiguration) -> Self {
        Self {
            config: Arc::new(config),
            notifier: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Report progress through a throttled observer.
    pub fn with_notifier(mut self, notifier: ProgressNotifier) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Stop walking as soon as `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn config(&self) -> &ScanConfiguration {
        &self.config
    }

    /// Scan `roots`, passing every surviving file to `transform`.
    ///
    /// Missing roots and unreadable entries contribute nothing. The only
    /// error is failing to start the worker pool.
    pub fn scan<T, F, I, P>(&self, roots: I, transform: F) -> Result<ScanOutput<T>, ScanError>
    where
        T: Send,
        F: Fn(&Path, &EntryMetadata) -> Option<T> + Sync,
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let start = Instant::now();
        let roots: Vec<PathBuf> = roots.into_iter().map(Into::into).collect();

        let workers = self.config.max_concurrency().min(roots.len()).max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("tidyscan-walk-{i}"))
            .build()
            .map_err(|e| ScanError::ThreadPool {
                message: e.to_string(),
            })?;

        info!(roots = roots.len(), workers, "Starting directory scan");

        let state = ScanState {
            accumulator: ResultAccumulator::new(),
            progress: ProgressTracker::with_total(roots.len() as u64),
            counters: Arc::new(WalkCounters::default()),
            files_seen: AtomicU64::new(0),
            notifier: self.notifier.as_ref(),
            notify_interval: self.config.notify_interval() as u64,
        };

        pool.install(|| {
            roots.par_iter().for_each(|root| {
                self.walk_root(root, &transform, &state);
                state.progress.complete_path(root);
            });
        });

        if let Some(notifier) = &self.notifier {
            notifier.finish(state.progress.snapshot());
        }

        let entries_visited = state.counters.visited();
        let skipped_entries = state.counters.skipped();
        let results = state.accumulator.into_results();
        let duration = start.elapsed();
        let cancelled = self.cancel.is_cancelled();

        info!(
            items = results.items.len(),
            total_size = results.total_size,
            entries_visited,
            skipped_entries,
            cancelled,
            elapsed_ms = duration.as_millis() as u64,
            "Directory scan finished"
        );

        Ok(ScanOutput {
            items: results.items,
            total_size: results.total_size,
            processed_count: results.processed_count,
            entries_visited,
            skipped_entries,
            duration,
            cancelled,
        })
    }

    /// Scan `roots` and collect every surviving file as a [`ScannedFile`].
    pub fn scan_files<I, P>(&self, roots: I) -> Result<ScanOutput<ScannedFile>, ScanError>
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.scan(roots, |path, meta| {
            Some(ScannedFile {
                path: path.to_path_buf(),
                size: meta.size,
                modified: meta.modified,
            })
        })
    }

    /// Walk a single root on the current worker.
    fn walk_root<T, F>(&self, root: &Path, transform: &F, state: &ScanState<'_, T>)
    where
        F: Fn(&Path, &EntryMetadata) -> Option<T>,
    {
        if !root.exists() {
            debug!(root = %root.display(), "Root does not exist; skipping");
            return;
        }

        let walker = configured_walker(
            root,
            &self.config,
            Parallelism::Serial,
            &self.cancel,
            &state.counters,
        );
        let mut batch = RootBatch::new();

        for entry_result in walker {
            if self.cancel.is_cancelled() {
                debug!(root = %root.display(), "Scan cancelled");
                break;
            }

            let entry = match entry_result {
                Ok(e) => e,
                Err(err) => {
                    debug!(error = %err, "Skipping unreadable entry");
                    state.counters.record_skip();
                    continue;
                }
            };

            // Directories and symlinks never become items.
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let metadata = match entry.metadata() {
                Ok(m) => EntryMetadata::from(&m),
                Err(err) => {
                    debug!(path = %path.display(), error = %err, "Skipping file without metadata");
                    state.counters.record_skip();
                    continue;
                }
            };

            batch.processed += 1;
            state.file_seen(&path);

            if !self.config.meets_size_floor(metadata.size) {
                continue;
            }

            if let Some(item) = transform(&path, &metadata) {
                batch.items.push(item);
                batch.size += metadata.size;
                if batch.items.len() >= MERGE_BATCH_SIZE {
                    batch.flush_into(&state.accumulator);
                }
            }
        }

        batch.flush_into(&state.accumulator);
    }
}

impl Default for DirectoryScanner {
    fn default() -> Self {
        Self::new(ScanConfiguration::default())
    }
}
