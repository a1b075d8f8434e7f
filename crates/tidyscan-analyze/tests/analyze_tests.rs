use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tempfile::TempDir;
use tidyscan_analyze::{
    ContentSource, DuplicateConfig, DuplicateFinder, DuplicateGroup, HashComputer,
    compute_hashes,
};
use tidyscan_scan::{DirectoryScanner, ScanConfiguration};

fn fixture() -> TempDir {
    tempfile::Builder::new().prefix("analyze").tempdir().unwrap()
}

/// Content source that holds each read open for a while and records how many
/// reads overlap.
struct SlowSource {
    in_flight: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    delay: Duration,
}

struct SlowReader {
    data: io::Cursor<Vec<u8>>,
    in_flight: Arc<AtomicUsize>,
}

impl Read for SlowReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.data.read(buf)
    }
}

impl Drop for SlowReader {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ContentSource for SlowSource {
    fn open(&self, path: &Path) -> io::Result<Box<dyn Read + Send>> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        Ok(Box::new(SlowReader {
            data: io::Cursor::new(path.to_string_lossy().into_owned().into_bytes()),
            in_flight: Arc::clone(&self.in_flight),
        }))
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_in_flight_reads_never_exceed_limit() {
    let in_flight = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let source = SlowSource {
        in_flight: Arc::clone(&in_flight),
        peak: Arc::clone(&peak),
        delay: Duration::from_millis(20),
    };

    let paths: Vec<PathBuf> = (0..40).map(|i| PathBuf::from(format!("/virtual/{i}"))).collect();
    let computer = HashComputer::new(4).unwrap().with_source(source);
    let hashes = computer.compute_hashes(paths.clone()).await;

    assert_eq!(hashes.len(), 40);
    assert_eq!(in_flight.load(Ordering::SeqCst), 0);
    let peak = peak.load(Ordering::SeqCst);
    assert!(peak <= 4, "peak concurrency {peak}");
    assert!(peak >= 2, "reads never overlapped");
}

#[tokio::test]
async fn test_identical_content_hashes_identically() {
    let temp = fixture();
    let a = temp.path().join("a.txt");
    let b = temp.path().join("nested/b.txt");
    let c = temp.path().join("c.txt");
    fs::write(&a, "same bytes").unwrap();
    fs::create_dir_all(b.parent().unwrap()).unwrap();
    fs::write(&b, "same bytes").unwrap();
    fs::write(&c, "other bytes").unwrap();

    let hashes = compute_hashes(vec![a.clone(), b.clone(), c.clone()], 1)
        .await
        .unwrap();

    assert_eq!(hashes.len(), 3);
    assert_eq!(hashes[&a], hashes[&b]);
    assert_ne!(hashes[&a], hashes[&c]);
    assert_eq!(hashes[&a].len(), 32);
}

#[tokio::test]
async fn test_compute_hashes_rejects_zero_concurrency() {
    assert!(compute_hashes(vec![PathBuf::from("/x")], 0).await.is_err());
}

#[tokio::test]
async fn test_empty_input_yields_empty_result() {
    let hashes = compute_hashes(Vec::new(), 3).await.unwrap();
    assert!(hashes.is_empty());
}

#[test]
fn test_duplicate_config_builder() {
    let config = DuplicateConfig::builder()
        .min_size(2048u64)
        .max_size(10 * 1024 * 1024u64)
        .max_concurrency(2usize)
        .max_groups(5usize)
        .build()
        .unwrap();

    assert_eq!(config.min_size, 2048);
    assert_eq!(config.max_size, 10 * 1024 * 1024);
    assert_eq!(config.max_concurrency, 2);
    assert_eq!(config.max_groups, 5);

    let default_config = DuplicateConfig::default();
    assert_eq!(default_config.min_size, 1);
    assert_eq!(default_config.max_groups, 0);
}

#[test]
fn test_duplicate_group_properties() {
    let group = DuplicateGroup {
        digest: "5d41402abc4b2a76b9719d911017c592".to_string(),
        size: 4096,
        paths: vec![
            PathBuf::from("/path/file1.txt"),
            PathBuf::from("/path/file2.txt"),
            PathBuf::from("/other/file3.txt"),
        ],
        wasted_bytes: 8192,
    };

    assert_eq!(group.count(), 3);
    assert_eq!(group.deletable_count(), 2);
}

#[tokio::test]
async fn test_find_duplicates_from_scan_output() {
    let temp = fixture();
    let content = vec![7u8; 2_000];
    fs::write(temp.path().join("one.bin"), &content).unwrap();
    fs::create_dir(temp.path().join("copies")).unwrap();
    fs::write(temp.path().join("copies/two.bin"), &content).unwrap();
    fs::write(temp.path().join("copies/three.bin"), &content).unwrap();
    // Same size, different bytes.
    fs::write(temp.path().join("decoy.bin"), vec![8u8; 2_000]).unwrap();
    fs::write(temp.path().join("unique.bin"), vec![7u8; 10]).unwrap();

    let output = DirectoryScanner::new(ScanConfiguration::junk_scan())
        .scan_files([temp.path()])
        .unwrap();
    let report = DuplicateFinder::new()
        .find_duplicates(output.items.into_iter().map(|f| (f.path, f.size)))
        .await
        .unwrap();

    assert!(report.has_duplicates());
    assert_eq!(report.group_count, 1);
    assert_eq!(report.files_analyzed, 5);
    assert_eq!(report.files_hashed, 4);

    let group = &report.groups[0];
    assert_eq!(group.count(), 3);
    assert_eq!(group.size, 2_000);
    assert_eq!(group.wasted_bytes, 4_000);
    assert_eq!(report.total_wasted_space, 4_000);
    assert_eq!(report.total_duplicate_size, 6_000);
    assert_eq!(report.total_duplicate_files(), 3);
}

#[tokio::test]
async fn test_find_duplicates_respects_size_bounds_and_group_limit() {
    let temp = fixture();
    let mut files = Vec::new();
    for (name, size) in [("s1", 10usize), ("s2", 10), ("m1", 500), ("m2", 500), ("l1", 900), ("l2", 900)] {
        let path = temp.path().join(name);
        fs::write(&path, vec![1u8; size]).unwrap();
        files.push((path, size as u64));
    }

    let config = DuplicateConfig::builder()
        .min_size(100u64)
        .max_groups(1usize)
        .build()
        .unwrap();
    let report = DuplicateFinder::with_config(config)
        .find_duplicates(files)
        .await
        .unwrap();

    // The 10-byte pair is below the floor, the 500-byte pair loses to the 900-byte one.
    assert_eq!(report.files_analyzed, 4);
    assert_eq!(report.group_count, 1);
    assert_eq!(report.groups[0].size, 900);
}

#[tokio::test]
async fn test_no_duplicates_skips_hashing() {
    let temp = fixture();
    let a = temp.path().join("a");
    let b = temp.path().join("b");
    fs::write(&a, "1").unwrap();
    fs::write(&b, "22").unwrap();

    let report = DuplicateFinder::new()
        .find_duplicates([(a, 1), (b, 2)])
        .await
        .unwrap();

    assert!(!report.has_duplicates());
    assert_eq!(report.files_hashed, 0);
}
