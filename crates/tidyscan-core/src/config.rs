//! Scan configuration types.

use std::collections::BTreeSet;
use std::path::Path;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

/// Size floor used by the large-file preset (50 MiB).
pub const LARGE_FILE_THRESHOLD: u64 = 50 * 1024 * 1024;

/// Directories (relative to a home-like root) the large-file preset never enters.
const SENSITIVE_PREFIXES: &[&str] = &[
    "Library/Keychains",
    "Library/Containers",
    "Library/Mail",
    "Library/Messages",
    "Library/Application Support/MobileSync",
    "System",
    "private",
];

/// Immutable policy for a scan.
///
/// Fields are only reachable through accessors; build one with
/// [`ScanConfiguration::builder`] or start from a preset.
#[derive(Debug, Clone, PartialEq, Eq, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
#[serde(try_from = "RawScanConfiguration")]
pub struct ScanConfiguration {
    /// Upper bound on concurrent workers.
    #[builder(default = "default_concurrency()")]
    max_concurrency: usize,

    /// Number of processed files between observer notifications.
    #[builder(default = "100")]
    notify_interval: usize,

    /// Files smaller than this many bytes are discarded.
    #[builder(default = "0")]
    min_file_size: u64,

    /// Include hidden files (starting with .).
    #[builder(default = "true")]
    include_hidden: bool,

    /// Root-relative path prefixes whose subtrees are pruned.
    #[builder(default, setter(each(name = "exclude", into)))]
    excluded_prefixes: BTreeSet<String>,
}

/// Wire form of [`ScanConfiguration`]; every value passes builder validation.
#[derive(Deserialize)]
struct RawScanConfiguration {
    #[serde(default = "default_concurrency")]
    max_concurrency: usize,
    #[serde(default = "default_notify_interval")]
    notify_interval: usize,
    #[serde(default)]
    min_file_size: u64,
    #[serde(default = "default_true")]
    include_hidden: bool,
    #[serde(default)]
    excluded_prefixes: BTreeSet<String>,
}

impl TryFrom<RawScanConfiguration> for ScanConfiguration {
    type Error = ScanConfigurationBuilderError;

    fn try_from(raw: RawScanConfiguration) -> Result<Self, Self::Error> {
        ScanConfiguration::builder()
            .max_concurrency(raw.max_concurrency)
            .notify_interval(raw.notify_interval)
            .min_file_size(raw.min_file_size)
            .include_hidden(raw.include_hidden)
            .excluded_prefixes(raw.excluded_prefixes)
            .build()
    }
}

fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

fn default_notify_interval() -> usize {
    100
}

fn default_true() -> bool {
    true
}

impl ScanConfigurationBuilder {
    fn validate(&self) -> Result<(), String> {
        if self.max_concurrency == Some(0) {
            return Err("max_concurrency must be at least 1".to_string());
        }
        if self.notify_interval == Some(0) {
            return Err("notify_interval must be at least 1".to_string());
        }
        if let Some(ref prefixes) = self.excluded_prefixes {
            if prefixes.iter().any(|p| p.trim_matches('/').is_empty()) {
                return Err("excluded prefixes cannot be empty".to_string());
            }
        }
        Ok(())
    }
}

impl ScanConfiguration {
    /// Create a new configuration builder.
    pub fn builder() -> ScanConfigurationBuilder {
        ScanConfigurationBuilder::default()
    }

    /// Permissive preset for junk discovery: every file, hidden ones
    /// included, with frequent observer updates.
    pub fn junk_scan() -> Self {
        Self {
            max_concurrency: default_concurrency(),
            notify_interval: 50,
            min_file_size: 0,
            include_hidden: true,
            excluded_prefixes: BTreeSet::new(),
        }
    }

    /// Preset for hunting large files: 50 MiB floor, hidden files skipped and
    /// sensitive system directories never entered.
    pub fn large_file_scan() -> Self {
        Self {
            max_concurrency: default_concurrency(),
            notify_interval: 500,
            min_file_size: LARGE_FILE_THRESHOLD,
            include_hidden: false,
            excluded_prefixes: SENSITIVE_PREFIXES.iter().map(|p| p.to_string()).collect(),
        }
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    pub fn notify_interval(&self) -> usize {
        self.notify_interval
    }

    pub fn min_file_size(&self) -> u64 {
        self.min_file_size
    }

    pub fn include_hidden(&self) -> bool {
        self.include_hidden
    }

    pub fn excluded_prefixes(&self) -> &BTreeSet<String> {
        &self.excluded_prefixes
    }

    /// Check whether a root-relative path falls under an excluded prefix.
    ///
    /// Matching is by whole path components, so `cache` excludes
    /// `cache/a.bin` but not `cache2/a.bin`. Leading and trailing slashes
    /// are ignored: `/cache/` means the same as `cache`.
    pub fn is_excluded(&self, relative: &Path) -> bool {
        self.excluded_prefixes
            .iter()
            .any(|prefix| relative.starts_with(prefix.trim_matches('/')))
    }

    /// Check whether a file of `size` bytes clears the size floor.
    pub fn meets_size_floor(&self, size: u64) -> bool {
        size >= self.min_file_size
    }

    /// Check if hidden files should be skipped.
    pub fn should_skip_hidden(&self, name: &str) -> bool {
        !self.include_hidden && name.starts_with('.')
    }
}

impl Default for ScanConfiguration {
    fn default() -> Self {
        Self::junk_scan()
    }
}
