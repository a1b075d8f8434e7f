//! Batching of observer notifications.
//!
//! Scan workers produce progress far faster than any UI wants to redraw.
//! [`UpdateThrottle`] buffers those notifications as opaque callbacks and
//! hands them over in batches, at most once per interval, to a
//! [`DeliveryContext`] that runs them where the observer expects:
//!
//! - [`DeliveryThread`] runs batches on a dedicated named thread.
//! - [`update_queue`] returns a sender/receiver pair for UI loops that drain
//!   pending batches once per frame on their own thread.

use std::fmt;
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::progress::ProgressSnapshot;

/// A deferred, zero-argument observer notification.
pub type PendingUpdate = Box<dyn FnOnce() + Send + 'static>;

/// Where flushed batches get executed.
///
/// Implementations must run the callbacks of one batch in order and must not
/// block the caller for longer than it takes to hand the batch off.
/// `deliver` is called with the throttle's lock held, so a context that runs
/// callbacks inline must not schedule on the same throttle from them.
pub trait DeliveryContext: Send + Sync {
    fn deliver(&self, batch: Vec<PendingUpdate>);
}

fn run_batch(batch: Vec<PendingUpdate>) -> usize {
    let count = batch.len();
    for update in batch {
        update();
    }
    count
}

/// Closures run batches inline on whichever thread flushed.
impl<F> DeliveryContext for F
where
    F: Fn(Vec<PendingUpdate>) + Send + Sync,
{
    fn deliver(&self, batch: Vec<PendingUpdate>) {
        self(batch)
    }
}

/// Delivery context backed by a dedicated thread.
pub struct DeliveryThread {
    sender: Option<Sender<Vec<PendingUpdate>>>,
    handle: Option<JoinHandle<()>>,
}

impl DeliveryThread {
    /// Spawn the delivery thread under the given name.
    pub fn spawn(name: &str) -> io::Result<Self> {
        let (sender, receiver) = crossbeam_channel::unbounded::<Vec<PendingUpdate>>();
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                for batch in receiver {
                    run_batch(batch);
                }
            })?;

        Ok(Self {
            sender: Some(sender),
            handle: Some(handle),
        })
    }

    /// Stop accepting batches and wait until every queued one has run.
    pub fn shutdown(mut self) {
        self.close();
    }

    fn close(&mut self) {
        self.sender.take();
        if let Some(handle) = self.handle.take() {
            // Dropped from one of our own callbacks; joining would deadlock.
            if handle.thread().id() == thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                warn!("Update delivery thread panicked");
            }
        }
    }
}

impl DeliveryContext for DeliveryThread {
    fn deliver(&self, batch: Vec<PendingUpdate>) {
        let Some(sender) = &self.sender else {
            return;
        };
        if sender.send(batch).is_err() {
            debug!("Delivery thread has stopped; dropping batch");
        }
    }
}

impl Drop for DeliveryThread {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for DeliveryThread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeliveryThread")
            .field("running", &self.sender.is_some())
            .finish()
    }
}

/// Sending half of an [`update_queue`].
#[derive(Clone)]
pub struct QueuedDelivery {
    sender: Sender<Vec<PendingUpdate>>,
}

impl DeliveryContext for QueuedDelivery {
    fn deliver(&self, batch: Vec<PendingUpdate>) {
        if self.sender.send(batch).is_err() {
            debug!("Update receiver dropped; discarding batch");
        }
    }
}

/// Receiving half of an [`update_queue`], owned by the observer's thread.
pub struct UpdateReceiver {
    receiver: Receiver<Vec<PendingUpdate>>,
}

impl UpdateReceiver {
    /// Run every batch delivered so far on the calling thread.
    ///
    /// Returns the number of callbacks executed.
    pub fn drain(&self) -> usize {
        let mut executed = 0;
        while let Ok(batch) = self.receiver.try_recv() {
            executed += run_batch(batch);
        }
        executed
    }

    /// Wait up to `timeout` for one batch and run it.
    ///
    /// Returns `None` once every sender is gone.
    pub fn run_next(&self, timeout: Duration) -> Option<usize> {
        match self.receiver.recv_timeout(timeout) {
            Ok(batch) => Some(run_batch(batch)),
            Err(RecvTimeoutError::Timeout) => Some(0),
            Err(RecvTimeoutError::Disconnected) => None,
        }
    }
}

/// Create a queue whose batches are executed by whoever owns the receiver.
pub fn update_queue() -> (QueuedDelivery, UpdateReceiver) {
    let (sender, receiver) = crossbeam_channel::unbounded();
    (QueuedDelivery { sender }, UpdateReceiver { receiver })
}

struct ThrottleState {
    pending: Vec<PendingUpdate>,
    last_flush: Instant,
}

/// Rate limiter between a chatty producer and a slow observer.
///
/// [`schedule`](Self::schedule) buffers a callback and flushes the buffer
/// when at least `min_interval` has passed since the previous flush. Producers
/// should call [`flush`](Self::flush) when they finish so the tail of the
/// batch is not left waiting for the next schedule.
pub struct UpdateThrottle {
    min_interval: Duration,
    delivery: Arc<dyn DeliveryContext>,
    state: Mutex<ThrottleState>,
}

impl UpdateThrottle {
    /// Ten batches per second.
    pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(100);

    pub fn new(min_interval: Duration, delivery: impl DeliveryContext + 'static) -> Self {
        Self::with_context(min_interval, Arc::new(delivery))
    }

    /// Create a throttle around a shared delivery context.
    ///
    /// The clock starts one interval in the past, so the very first update
    /// is delivered without delay.
    pub fn with_context(min_interval: Duration, delivery: Arc<dyn DeliveryContext>) -> Self {
        let now = Instant::now();
        Self {
            min_interval,
            delivery,
            state: Mutex::new(ThrottleState {
                pending: Vec::new(),
                last_flush: now.checked_sub(min_interval).unwrap_or(now),
            }),
        }
    }

    /// Queue an update, flushing right away if the interval has elapsed.
    pub fn schedule<F>(&self, update: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut state = self.state.lock();
        state.pending.push(Box::new(update));
        if state.last_flush.elapsed() >= self.min_interval {
            self.hand_off(&mut state);
        }
    }

    /// Hand every pending update to the delivery context.
    ///
    /// Does nothing, including leaving the flush clock untouched, when no
    /// update is pending.
    pub fn flush(&self) {
        let mut state = self.state.lock();
        if !state.pending.is_empty() {
            self.hand_off(&mut state);
        }
    }

    // Runs under the state lock so batches reach the context in flush order.
    fn hand_off(&self, state: &mut ThrottleState) {
        state.last_flush = Instant::now();
        self.delivery.deliver(std::mem::take(&mut state.pending));
    }

    pub fn pending_len(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Instant of the most recent flush that delivered something.
    pub fn last_flush(&self) -> Instant {
        self.state.lock().last_flush
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }
}

impl fmt::Debug for UpdateThrottle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpdateThrottle")
            .field("min_interval", &self.min_interval)
            .field("pending", &self.pending_len())
            .finish_non_exhaustive()
    }
}

/// Observer callback receiving progress snapshots.
pub type ProgressCallback = Arc<dyn Fn(ProgressSnapshot) + Send + Sync>;

/// Routes progress snapshots through an [`UpdateThrottle`] to a callback.
#[derive(Clone)]
pub struct ProgressNotifier {
    throttle: Arc<UpdateThrottle>,
    callback: ProgressCallback,
}

impl ProgressNotifier {
    pub fn new<F>(throttle: Arc<UpdateThrottle>, callback: F) -> Self
    where
        F: Fn(ProgressSnapshot) + Send + Sync + 'static,
    {
        Self {
            throttle,
            callback: Arc::new(callback),
        }
    }

    pub fn notify(&self, snapshot: ProgressSnapshot) {
        let callback = Arc::clone(&self.callback);
        self.throttle.schedule(move || callback(snapshot));
    }

    /// Send the final snapshot and flush whatever is still buffered.
    pub fn finish(&self, snapshot: ProgressSnapshot) {
        self.notify(snapshot);
        self.throttle.flush();
    }

    pub fn throttle(&self) -> &Arc<UpdateThrottle> {
        &self.throttle
    }
}

impl fmt::Debug for ProgressNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressNotifier")
            .field("throttle", &self.throttle)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Recorder {
        batches: Mutex<Vec<usize>>,
    }

    impl DeliveryContext for Recorder {
        fn deliver(&self, batch: Vec<PendingUpdate>) {
            self.batches.lock().push(batch.len());
            run_batch(batch);
        }
    }

    fn throttle_with_recorder(interval: Duration) -> (UpdateThrottle, Arc<Recorder>) {
        let recorder = Arc::new(Recorder::default());
        let context: Arc<dyn DeliveryContext> = recorder.clone();
        (UpdateThrottle::with_context(interval, context), recorder)
    }

    #[test]
    fn test_first_update_is_immediate() {
        let (throttle, recorder) = throttle_with_recorder(Duration::from_secs(60));
        throttle.schedule(|| {});

        assert_eq!(*recorder.batches.lock(), vec![1]);
        assert_eq!(throttle.pending_len(), 0);
    }

    #[test]
    fn test_updates_within_interval_are_batched_in_order() {
        let (throttle, recorder) = throttle_with_recorder(Duration::from_secs(60));
        throttle.schedule(|| {});

        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..5 {
            let order = Arc::clone(&order);
            throttle.schedule(move || order.lock().push(i));
        }
        assert_eq!(throttle.pending_len(), 5);
        assert!(order.lock().is_empty());

        throttle.flush();
        assert_eq!(*recorder.batches.lock(), vec![1, 5]);
        assert_eq!(*order.lock(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_schedule_after_interval_flushes() {
        let (throttle, recorder) = throttle_with_recorder(Duration::from_millis(20));
        throttle.schedule(|| {});
        throttle.schedule(|| {});
        thread::sleep(Duration::from_millis(30));
        throttle.schedule(|| {});

        assert_eq!(*recorder.batches.lock(), vec![1, 2]);
    }

    #[test]
    fn test_empty_flush_is_a_no_op() {
        let (throttle, recorder) = throttle_with_recorder(Duration::from_millis(50));
        throttle.schedule(|| {});
        let before = throttle.last_flush();

        thread::sleep(Duration::from_millis(5));
        throttle.flush();

        assert_eq!(throttle.last_flush(), before);
        assert_eq!(*recorder.batches.lock(), vec![1]);
    }

    #[test]
    fn test_delivery_thread_runs_callbacks_off_caller() {
        let delivery = DeliveryThread::spawn("tidyscan-test-delivery").unwrap();
        let throttle = UpdateThrottle::new(Duration::ZERO, delivery);

        let (tx, rx) = crossbeam_channel::unbounded();
        throttle.schedule(move || {
            let name = thread::current().name().map(str::to_string);
            tx.send(name).unwrap();
        });

        let name = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(name.as_deref(), Some("tidyscan-test-delivery"));
    }

    #[test]
    fn test_update_queue_runs_on_draining_thread() {
        let (delivery, receiver) = update_queue();
        let throttle = UpdateThrottle::new(Duration::from_secs(60), delivery);
        let hits = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let hits = Arc::clone(&hits);
            throttle.schedule(move || {
                hits.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        throttle.flush();
        assert_eq!(receiver.drain(), 3);
        assert_eq!(hits.load(Ordering::SeqCst), 3);
        assert_eq!(receiver.drain(), 0);
    }

    #[test]
    fn test_progress_notifier_finish_flushes() {
        let (throttle, recorder) = throttle_with_recorder(Duration::from_secs(60));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let notifier = ProgressNotifier::new(Arc::new(throttle), move |snapshot| {
            sink.lock().push(snapshot.completed_units);
        });

        let tracker = crate::ProgressTracker::with_total(2);
        tracker.complete(1);
        notifier.notify(tracker.snapshot());
        tracker.complete(1);
        notifier.notify(tracker.snapshot());
        notifier.finish(tracker.snapshot());

        assert_eq!(*seen.lock(), vec![1, 2, 2]);
        assert_eq!(*recorder.batches.lock(), vec![1, 2]);
    }

    /// Runs batches inline, stalling on the first one it receives.
    struct StallFirst {
        stalled: std::sync::atomic::AtomicBool,
        entered: Sender<()>,
    }

    impl DeliveryContext for StallFirst {
        fn deliver(&self, batch: Vec<PendingUpdate>) {
            if !self.stalled.swap(true, Ordering::SeqCst) {
                let _ = self.entered.send(());
                thread::sleep(Duration::from_millis(50));
            }
            run_batch(batch);
        }
    }

    #[test]
    fn test_batches_reach_context_in_flush_order() {
        let (entered, entered_rx) = crossbeam_channel::unbounded();
        let throttle = Arc::new(UpdateThrottle::new(
            Duration::ZERO,
            StallFirst {
                stalled: std::sync::atomic::AtomicBool::new(false),
                entered,
            },
        ));
        let order = Arc::new(Mutex::new(Vec::new()));

        let first = {
            let throttle = Arc::clone(&throttle);
            let order = Arc::clone(&order);
            thread::spawn(move || throttle.schedule(move || order.lock().push(0)))
        };
        // Wait until the first batch is stuck inside the context.
        entered_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        let sink = Arc::clone(&order);
        throttle.schedule(move || sink.lock().push(1));
        first.join().unwrap();

        assert_eq!(*order.lock(), vec![0, 1]);
    }

    #[test]
    fn test_run_next_waits_for_one_batch() {
        let (delivery, receiver) = update_queue();
        let throttle = UpdateThrottle::new(Duration::from_secs(60), delivery);
        let hits = Arc::new(AtomicUsize::new(0));

        assert_eq!(receiver.run_next(Duration::from_millis(1)), Some(0));

        let counter = Arc::clone(&hits);
        throttle.schedule(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(receiver.run_next(Duration::from_secs(5)), Some(1));
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        drop(throttle);
        assert_eq!(receiver.run_next(Duration::from_millis(1)), None);
    }

    #[test]
    fn test_delivery_thread_shutdown_drains_queue() {
        let delivery = DeliveryThread::spawn("tidyscan-test-shutdown").unwrap();
        let hits = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let counter = Arc::clone(&hits);
            delivery.deliver(vec![Box::new(move || {
                thread::sleep(Duration::from_millis(5));
                counter.fetch_add(1, Ordering::SeqCst);
            })]);
        }
        delivery.shutdown();

        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_closure_context_runs_inline() {
        let hits = Arc::new(AtomicUsize::new(0));
        let throttle = UpdateThrottle::new(Duration::ZERO, |batch: Vec<PendingUpdate>| {
            run_batch(batch);
        });

        let counter = Arc::clone(&hits);
        throttle.schedule(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
