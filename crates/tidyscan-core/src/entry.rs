//! Per-entry metadata handed to scan transforms.

use std::fs::Metadata;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

/// The subset of filesystem metadata a transform gets to see.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryMetadata {
    /// Size in bytes.
    pub size: u64,
    /// Last modification time, when the platform reports one.
    pub modified: Option<SystemTime>,
    /// Whether the entry is a directory.
    pub is_dir: bool,
}

impl EntryMetadata {
    pub fn new(size: u64, modified: Option<SystemTime>, is_dir: bool) -> Self {
        Self {
            size,
            modified,
            is_dir,
        }
    }

    /// Metadata for a regular file of the given size.
    pub fn file(size: u64) -> Self {
        Self::new(size, None, false)
    }
}

impl From<&Metadata> for EntryMetadata {
    fn from(metadata: &Metadata) -> Self {
        Self {
            size: metadata.len(),
            modified: metadata.modified().ok(),
            is_dir: metadata.is_dir(),
        }
    }
}
