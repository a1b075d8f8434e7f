//! Duplicate file detection using content digests.
//!
//! Two phases:
//! 1. Group files by size (instant, O(n)); sizes seen once cannot have duplicates.
//! 2. Hash the remaining candidates through [`HashComputer`] and group by digest.
//!
//! Only size collisions are ever read from disk.

use std::collections::HashMap;
use std::path::PathBuf;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::info;

use tidyscan_core::ScanError;

use crate::hash::HashComputer;

/// Configuration for duplicate detection.
#[derive(Debug, Clone, Builder)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct DuplicateConfig {
    /// Minimum file size to consider (empty files are all "duplicates").
    #[builder(default = "1")]
    pub min_size: u64,

    /// Maximum file size to consider (skip huge files).
    #[builder(default = "u64::MAX")]
    pub max_size: u64,

    /// Files hashed concurrently.
    #[builder(default = "4")]
    pub max_concurrency: usize,

    /// Maximum number of groups to return (0 = unlimited).
    #[builder(default = "0")]
    pub max_groups: usize,
}

impl DuplicateConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if self.max_concurrency == Some(0) {
            return Err("max_concurrency must be at least 1".to_string());
        }
        if let (Some(min), Some(max)) = (self.min_size, self.max_size) {
            if min > max {
                return Err(format!("min_size {min} exceeds max_size {max}"));
            }
        }
        Ok(())
    }
}

impl Default for DuplicateConfig {
    fn default() -> Self {
        Self {
            min_size: 1,
            max_size: u64::MAX,
            max_concurrency: 4,
            max_groups: 0,
        }
    }
}

impl DuplicateConfig {
    /// Create a new config builder.
    pub fn builder() -> DuplicateConfigBuilder {
        DuplicateConfigBuilder::default()
    }
}

/// A group of files sharing the same content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicateGroup {
    /// Lowercase hex digest shared by all files in this group.
    pub digest: String,

    /// Size of each file in bytes.
    pub size: u64,

    /// Paths to all duplicate files.
    pub paths: Vec<PathBuf>,

    /// Wasted space: size * (count - 1).
    pub wasted_bytes: u64,
}

impl DuplicateGroup {
    /// Get the number of duplicate files.
    pub fn count(&self) -> usize {
        self.paths.len()
    }

    /// Check if keeping one file, how many could be deleted.
    pub fn deletable_count(&self) -> usize {
        self.paths.len().saturating_sub(1)
    }
}

/// Results from duplicate analysis.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DuplicateReport {
    /// Groups of duplicate files, sorted by wasted space descending.
    pub groups: Vec<DuplicateGroup>,

    /// Total size of all duplicate files.
    pub total_duplicate_size: u64,

    /// Total wasted space (could be reclaimed).
    pub total_wasted_space: u64,

    /// Number of files within the size bounds.
    pub files_analyzed: u64,

    /// Number of files whose content was actually read.
    pub files_hashed: u64,

    /// Number of unique duplicate groups.
    pub group_count: usize,
}

impl DuplicateReport {
    /// Check if any duplicates were found.
    pub fn has_duplicates(&self) -> bool {
        !self.groups.is_empty()
    }

    /// Get total number of duplicate files across all groups.
    pub fn total_duplicate_files(&self) -> usize {
        self.groups.iter().map(|g| g.paths.len()).sum()
    }
}

/// Duplicate file finder.
#[derive(Debug, Clone, Default)]
pub struct DuplicateFinder {
    config: DuplicateConfig,
    cancel: CancellationToken,
}

impl DuplicateFinder {
    /// Create a new duplicate finder with default config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new duplicate finder with custom config.
    pub fn with_config(config: DuplicateConfig) -> Self {
        Self {
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Stop hashing once `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Find duplicates among `(path, size)` pairs, typically a scan's output.
    pub async fn find_duplicates<I>(&self, files: I) -> Result<DuplicateReport, ScanError>
    where
        I: IntoIterator<Item = (PathBuf, u64)>,
    {
        let files: Vec<(PathBuf, u64)> = files
            .into_iter()
            .filter(|(_, size)| *size >= self.config.min_size && *size <= self.config.max_size)
            .collect();
        let files_analyzed = files.len() as u64;

        // Phase 1: group by size, keep only collisions
        let size_groups = group_by_size(files);
        let candidates: Vec<PathBuf> = size_groups.values().flatten().cloned().collect();

        // Phase 2: hash candidates and group by (size, digest)
        let hasher = HashComputer::new(self.config.max_concurrency)?
            .with_cancellation(self.cancel.clone());
        let digests = hasher.compute_hashes(candidates).await;
        let files_hashed = digests.len() as u64;

        let mut groups: Vec<DuplicateGroup> = Vec::new();
        for (size, paths) in size_groups {
            let mut by_digest: HashMap<&str, Vec<PathBuf>> = HashMap::new();
            for path in paths {
                if let Some(digest) = digests.get(&path) {
                    by_digest.entry(digest.as_str()).or_default().push(path);
                }
            }

            for (digest, mut paths) in by_digest {
                if paths.len() < 2 {
                    continue;
                }
                paths.sort();
                let wasted_bytes = size * (paths.len() as u64 - 1);
                groups.push(DuplicateGroup {
                    digest: digest.to_string(),
                    size,
                    paths,
                    wasted_bytes,
                });
            }
        }

        // Sort by wasted space descending
        groups.sort_by(|a, b| {
            b.wasted_bytes
                .cmp(&a.wasted_bytes)
                .then_with(|| a.digest.cmp(&b.digest))
        });

        // Apply max_groups limit if set
        if self.config.max_groups > 0 && groups.len() > self.config.max_groups {
            groups.truncate(self.config.max_groups);
        }

        let total_duplicate_size: u64 = groups.iter().map(|g| g.size * g.paths.len() as u64).sum();
        let total_wasted_space: u64 = groups.iter().map(|g| g.wasted_bytes).sum();
        let group_count = groups.len();

        info!(
            files_analyzed,
            files_hashed, group_count, total_wasted_space, "Duplicate analysis finished"
        );

        Ok(DuplicateReport {
            groups,
            total_duplicate_size,
            total_wasted_space,
            files_analyzed,
            files_hashed,
            group_count,
        })
    }
}

/// Group files by size, dropping sizes that occur only once.
fn group_by_size(files: Vec<(PathBuf, u64)>) -> HashMap<u64, Vec<PathBuf>> {
    let mut groups: HashMap<u64, Vec<PathBuf>> = HashMap::new();
    for (path, size) in files {
        groups.entry(size).or_default().push(path);
    }
    groups.retain(|_, v| v.len() > 1);
    groups
}
