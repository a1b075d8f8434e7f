//! Serialized result collection shared by scan workers.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Point-in-time view of an accumulator's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccumulatorSnapshot {
    /// Number of collected items.
    pub item_count: usize,
    /// Sum of the sizes recorded alongside the items.
    pub total_size: u64,
    /// Number of files examined, collected or not.
    pub processed_count: u64,
}

/// Final contents of an accumulator once its scan has finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccumulatedResults<T> {
    pub items: Vec<T>,
    pub total_size: u64,
    pub processed_count: u64,
}

#[derive(Debug)]
struct AccumulatorState<T> {
    items: Vec<T>,
    total_size: u64,
    processed_count: u64,
}

impl<T> Default for AccumulatorState<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            total_size: 0,
            processed_count: 0,
        }
    }
}

/// Growing collection of scan results with a running byte total and a
/// processed-file counter.
///
/// Every operation takes the internal lock for its whole duration, so
/// concurrent workers can push without coordinating with each other. An
/// accumulator belongs to a single scan; call [`clear`](Self::clear) before
/// reusing one, otherwise totals from the previous run leak into the next.
#[derive(Debug)]
pub struct ResultAccumulator<T> {
    state: Mutex<AccumulatorState<T>>,
}

impl<T> ResultAccumulator<T> {
    /// Create an empty accumulator.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(AccumulatorState::default()),
        }
    }

    /// Append one item and add its size to the total.
    pub fn push(&self, item: T, size: u64) {
        let mut state = self.state.lock();
        state.items.push(item);
        state.total_size = state.total_size.saturating_add(size);
    }

    /// Merge a worker's local batch under a single lock acquisition.
    pub fn merge(&self, items: Vec<T>, size: u64, processed: u64) {
        let mut state = self.state.lock();
        state.items.extend(items);
        state.total_size = state.total_size.saturating_add(size);
        state.processed_count = state.processed_count.saturating_add(processed);
    }

    /// Add bytes to the running total without adding an item.
    pub fn add_size(&self, size: u64) {
        let mut state = self.state.lock();
        state.total_size = state.total_size.saturating_add(size);
    }

    /// Count `n` more processed files.
    pub fn increment_processed(&self, n: u64) {
        let mut state = self.state.lock();
        state.processed_count = state.processed_count.saturating_add(n);
    }

    pub fn total_size(&self) -> u64 {
        self.state.lock().total_size
    }

    pub fn processed_count(&self) -> u64 {
        self.state.lock().processed_count
    }

    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().items.is_empty()
    }

    /// Read all counters at once.
    pub fn snapshot(&self) -> AccumulatorSnapshot {
        let state = self.state.lock();
        AccumulatorSnapshot {
            item_count: state.items.len(),
            total_size: state.total_size,
            processed_count: state.processed_count,
        }
    }

    /// Zero every counter and drop all items.
    pub fn clear(&self) {
        *self.state.lock() = AccumulatorState::default();
    }

    /// Consume the accumulator and hand back its contents.
    pub fn into_results(self) -> AccumulatedResults<T> {
        let state = self.state.into_inner();
        AccumulatedResults {
            items: state.items,
            total_size: state.total_size,
            processed_count: state.processed_count,
        }
    }
}

impl<T> Default for ResultAccumulator<T> {
    fn default() -> Self {
        Self::new()
    }
}
