//! Bounded-concurrency content hashing.
//!
//! Every path is admitted in input order once a semaphore permit is free,
//! read on tokio's blocking pool and digested with MD5. Files that cannot be
//! read are left out of the result instead of failing the batch.

use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use tidyscan_core::{ProgressNotifier, ProgressTracker, ScanError};

/// Path to lowercase hex digest. Unreadable files are absent.
pub type HashResult = HashMap<PathBuf, String>;

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// 128-bit MD5 content digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentDigest(pub [u8; 16]);

impl ContentDigest {
    pub fn new(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Get the digest as a lowercase hex string.
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }

    /// Digest everything `reader` yields.
    pub fn from_reader(reader: &mut dyn Read) -> io::Result<Self> {
        let mut hasher = Md5::new();
        let mut buffer = vec![0u8; READ_BUFFER_SIZE];

        loop {
            let bytes_read = match reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            hasher.update(&buffer[..bytes_read]);
        }

        Ok(Self(hasher.finalize().into()))
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Where file contents come from.
pub trait ContentSource: Send + Sync + 'static {
    fn open(&self, path: &Path) -> io::Result<Box<dyn Read + Send>>;
}

/// Reads contents straight from the local filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsContent;

impl ContentSource for FsContent {
    fn open(&self, path: &Path) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(File::open(path)?))
    }
}

/// Hashes many files with at most `max_concurrency` reads in flight.
#[derive(Clone)]
pub struct HashComputer {
    max_concurrency: usize,
    source: Arc<dyn ContentSource>,
    notifier: Option<ProgressNotifier>,
    cancel: CancellationToken,
}

impl HashComputer {
    /// Create a hash computer reading from the filesystem.
    pub fn new(max_concurrency: usize) -> Result<Self, ScanError> {
        if max_concurrency == 0 {
            return Err(ScanError::invalid_config(
                "hash concurrency must be at least 1",
            ));
        }
        Ok(Self {
            max_concurrency,
            source: Arc::new(FsContent),
            notifier: None,
            cancel: CancellationToken::new(),
        })
    }

    /// Read contents from `source` instead of the filesystem.
    pub fn with_source(mut self, source: impl ContentSource) -> Self {
        self.source = Arc::new(source);
        self
    }

    /// Report one progress unit per finished file.
    pub fn with_notifier(mut self, notifier: ProgressNotifier) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Stop admitting new files once `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Digest a single file through the configured source.
    pub fn hash_file(&self, path: &Path) -> io::Result<ContentDigest> {
        digest_path(self.source.as_ref(), path)
    }

    /// Digest every path, returning the readable ones.
    ///
    /// Admission follows input order; completion order is unspecified.
    /// Must be called from within a tokio runtime.
    pub async fn compute_hashes<I, P>(&self, paths: I) -> HashResult
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let paths: Vec<PathBuf> = paths.into_iter().map(Into::into).collect();
        let requested = paths.len();
        let tracker = Arc::new(ProgressTracker::with_total(requested as u64));
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let digests: Arc<DashMap<PathBuf, String>> = Arc::new(DashMap::new());
        let mut tasks = JoinSet::new();

        for path in paths {
            let permit = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    debug!("Hashing cancelled; no further files admitted");
                    break;
                }
                permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let source = Arc::clone(&self.source);
            let digests = Arc::clone(&digests);
            let tracker = Arc::clone(&tracker);
            let notifier = self.notifier.clone();

            tasks.spawn_blocking(move || {
                let _permit = permit;
                match digest_path(source.as_ref(), &path) {
                    Ok(digest) => {
                        digests.insert(path.clone(), digest.to_hex());
                    }
                    Err(err) => {
                        debug!(path = %path.display(), error = %err, "Skipping unreadable file");
                    }
                }
                tracker.complete_path(path);
                if let Some(notifier) = notifier {
                    notifier.notify(tracker.snapshot());
                }
            });

            // Reap whatever already finished so the set stays small.
            while let Some(result) = tasks.try_join_next() {
                log_join_failure(result);
            }
        }

        while let Some(result) = tasks.join_next().await {
            log_join_failure(result);
        }

        if let Some(notifier) = &self.notifier {
            notifier.finish(tracker.snapshot());
        }

        let result: HashResult = digests
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        info!(requested, hashed = result.len(), "Hashing finished");
        result
    }
}

impl fmt::Debug for HashComputer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HashComputer")
            .field("max_concurrency", &self.max_concurrency)
            .field("notifier", &self.notifier)
            .finish_non_exhaustive()
    }
}

/// Hash `paths` from the filesystem with at most `max_concurrency` reads in flight.
pub async fn compute_hashes(
    paths: Vec<PathBuf>,
    max_concurrency: usize,
) -> Result<HashResult, ScanError> {
    Ok(HashComputer::new(max_concurrency)?
        .compute_hashes(paths)
        .await)
}

fn digest_path(source: &dyn ContentSource, path: &Path) -> io::Result<ContentDigest> {
    let mut reader = source.open(path)?;
    ContentDigest::from_reader(&mut reader)
}

fn log_join_failure(result: Result<(), JoinError>) {
    if let Err(err) = result {
        warn!(error = %err, "Hash task failed");
    }
}
