//! Progress tracking shared between workers and observers.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Progress information at one instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    /// Units of work finished so far.
    pub completed_units: u64,
    /// Units of work expected in total (0 when unknown).
    pub total_units: u64,
    /// Path most recently visited.
    pub current_path: PathBuf,
    /// Time elapsed since the tracker was created or reset.
    pub elapsed: Duration,
}

impl ProgressSnapshot {
    /// Completion fraction in `[0, 1]`; 0 while the total is unknown.
    pub fn fraction(&self) -> f64 {
        if self.total_units > 0 {
            (self.completed_units as f64 / self.total_units as f64).min(1.0)
        } else {
            0.0
        }
    }

    /// Calculate throughput in units per second.
    pub fn units_per_second(&self) -> f64 {
        if self.elapsed.as_secs_f64() > 0.0 {
            self.completed_units as f64 / self.elapsed.as_secs_f64()
        } else {
            0.0
        }
    }
}

#[derive(Debug)]
struct TrackerState {
    start_time: Instant,
    completed_units: u64,
    total_units: u64,
    current_path: PathBuf,
}

impl TrackerState {
    fn new() -> Self {
        Self {
            start_time: Instant::now(),
            completed_units: 0,
            total_units: 0,
            current_path: PathBuf::new(),
        }
    }
}

/// Completed-versus-total counter plus the path currently being visited.
///
/// All access goes through one lock; reads return owned snapshots.
#[derive(Debug)]
pub struct ProgressTracker {
    state: Mutex<TrackerState>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(TrackerState::new()),
        }
    }

    /// Create a tracker that already knows how much work is coming.
    pub fn with_total(total_units: u64) -> Self {
        let tracker = Self::new();
        tracker.set_total(total_units);
        tracker
    }

    pub fn set_total(&self, total_units: u64) {
        self.state.lock().total_units = total_units;
    }

    /// Grow the expected total, e.g. when a directory reveals more work.
    pub fn add_total(&self, units: u64) {
        let mut state = self.state.lock();
        state.total_units = state.total_units.saturating_add(units);
    }

    /// Mark `units` more as done.
    pub fn complete(&self, units: u64) {
        let mut state = self.state.lock();
        state.completed_units = state.completed_units.saturating_add(units);
    }

    pub fn set_current_path(&self, path: impl Into<PathBuf>) {
        self.state.lock().current_path = path.into();
    }

    /// Mark one unit done and record the path that finished it.
    pub fn complete_path(&self, path: impl Into<PathBuf>) {
        let mut state = self.state.lock();
        state.completed_units = state.completed_units.saturating_add(1);
        state.current_path = path.into();
    }

    pub fn fraction(&self) -> f64 {
        self.snapshot().fraction()
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        let state = self.state.lock();
        ProgressSnapshot {
            completed_units: state.completed_units,
            total_units: state.total_units,
            current_path: state.current_path.clone(),
            elapsed: state.start_time.elapsed(),
        }
    }

    /// Zero all counters and restart the clock.
    pub fn reset(&self) {
        *self.state.lock() = TrackerState::new();
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fraction_with_unknown_total() {
        let tracker = ProgressTracker::new();
        tracker.complete(5);
        assert_eq!(tracker.fraction(), 0.0);
    }

    #[test]
    fn test_fraction() {
        let tracker = ProgressTracker::with_total(4);
        tracker.complete(1);
        tracker.complete_path("/data/b.bin");

        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.completed_units, 2);
        assert_eq!(snapshot.fraction(), 0.5);
        assert_eq!(snapshot.current_path, PathBuf::from("/data/b.bin"));
    }

    #[test]
    fn test_add_total_grows_expected_work() {
        let tracker = ProgressTracker::with_total(2);
        tracker.complete(2);
        assert_eq!(tracker.fraction(), 1.0);

        tracker.add_total(2);
        assert_eq!(tracker.fraction(), 0.5);
        assert_eq!(tracker.snapshot().total_units, 4);
    }

    #[test]
    fn test_units_per_second() {
        let snapshot = ProgressSnapshot {
            completed_units: 50,
            total_units: 100,
            current_path: PathBuf::new(),
            elapsed: Duration::from_secs(2),
        };
        assert_eq!(snapshot.units_per_second(), 25.0);

        let instant = ProgressSnapshot {
            elapsed: Duration::ZERO,
            ..snapshot
        };
        assert_eq!(instant.units_per_second(), 0.0);
    }

    #[test]
    fn test_reset() {
        let tracker = ProgressTracker::with_total(10);
        tracker.complete(10);
        tracker.set_current_path("/x");
        tracker.reset();

        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.completed_units, 0);
        assert_eq!(snapshot.total_units, 0);
        assert_eq!(snapshot.current_path, PathBuf::new());
    }
}
