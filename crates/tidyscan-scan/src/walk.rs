//! Shared jwalk setup for the scanner and the size computer.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use jwalk::{Parallelism, WalkDir};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use tidyscan_core::ScanConfiguration;

/// Counters shared by every read_dir callback of one walk.
#[derive(Debug, Default)]
pub(crate) struct WalkCounters {
    /// Entries handed to the walker after pruning.
    pub entries_visited: AtomicU64,
    /// Entries dropped because they could not be read.
    pub skipped_entries: AtomicU64,
}

impl WalkCounters {
    pub fn record_skip(&self) {
        self.skipped_entries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn visited(&self) -> u64 {
        self.entries_visited.load(Ordering::Relaxed)
    }

    pub fn skipped(&self) -> u64 {
        self.skipped_entries.load(Ordering::Relaxed)
    }
}

/// Build a walker for `root` that honors the hidden-file policy and prunes
/// excluded prefixes before jwalk ever reads them.
///
/// Pruning happens in `process_read_dir`: an excluded directory is removed
/// from its parent's children, so its contents are never enumerated.
pub(crate) fn configured_walker(
    root: &Path,
    config: &Arc<ScanConfiguration>,
    parallelism: Parallelism,
    cancel: &CancellationToken,
    counters: &Arc<WalkCounters>,
) -> WalkDir {
    let root_path: PathBuf = root.to_path_buf();
    let config_for_dirs = Arc::clone(config);
    let cancel = cancel.clone();
    let counters = Arc::clone(counters);

    WalkDir::new(root)
        .parallelism(parallelism)
        .skip_hidden(!config.include_hidden())
        .follow_links(false)
        .process_read_dir(move |_depth, _dir_path, _state, children| {
            if cancel.is_cancelled() {
                children.clear();
                return;
            }

            if !config_for_dirs.excluded_prefixes().is_empty() {
                children.retain(|child| {
                    let Ok(entry) = child else {
                        return true;
                    };
                    let path = entry.path();
                    let excluded = path
                        .strip_prefix(&root_path)
                        .map(|relative| config_for_dirs.is_excluded(relative))
                        .unwrap_or(false);
                    if excluded {
                        debug!(path = %path.display(), "Pruned excluded entry");
                    }
                    !excluded
                });
            }

            counters
                .entries_visited
                .fetch_add(children.len() as u64, Ordering::Relaxed);
        })
}
