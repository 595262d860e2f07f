//! Shared helpers for aggregator integration tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use asyncbatch::{ProcessResult, Processor};
use tokio::sync::{Mutex, Notify, Semaphore};
use tracing_subscriber::EnvFilter;

/// Initializes tracing for a test run. Safe to call from every test.
pub fn init_test_tracing() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .init();
    });
}

/// Processor that records every batch it receives and wakes waiters.
pub struct RecordingProcessor<T> {
    batches: Arc<Mutex<Vec<Vec<T>>>>,
    notify: Arc<Notify>,
}

impl<T> RecordingProcessor<T> {
    pub fn new() -> Self {
        Self {
            batches: Arc::new(Mutex::new(Vec::new())),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Snapshot of every batch received so far.
    pub async fn batches(&self) -> Vec<Vec<T>>
    where
        T: Clone,
    {
        self.batches.lock().await.clone()
    }

    /// Total number of items received across all batches.
    pub async fn total_items(&self) -> usize {
        self.batches.lock().await.iter().map(Vec::len).sum()
    }

    /// Waits until at least `expected` items were processed.
    ///
    /// Panics when `timeout` elapses first, so a stuck pipeline fails the
    /// test quickly instead of hanging it.
    pub async fn wait_for_items(&self, expected: usize, timeout: Duration) {
        let deadline = Instant::now() + timeout;
        loop {
            if self.total_items().await >= expected {
                return;
            }
            if Instant::now() >= deadline {
                panic!(
                    "timed out waiting for {expected} processed items, got {}",
                    self.total_items().await
                );
            }
            let _ = tokio::time::timeout(Duration::from_millis(10), self.notify.notified()).await;
        }
    }
}

impl<T> Clone for RecordingProcessor<T> {
    fn clone(&self) -> Self {
        Self {
            batches: Arc::clone(&self.batches),
            notify: Arc::clone(&self.notify),
        }
    }
}

impl<T> Processor<T> for RecordingProcessor<T>
where
    T: Send + 'static,
{
    async fn process(&self, batch: Vec<T>) -> ProcessResult {
        self.batches.lock().await.push(batch);
        self.notify.notify_waiters();
        Ok(())
    }
}

/// Processor that blocks inside `process` until the test opens its gate,
/// simulating a saturated downstream pipeline.
pub struct StallingProcessor<T> {
    gate: Arc<Semaphore>,
    entered: Arc<AtomicUsize>,
    inner: RecordingProcessor<T>,
}

impl<T> StallingProcessor<T> {
    pub fn new() -> Self {
        Self {
            gate: Arc::new(Semaphore::new(0)),
            entered: Arc::new(AtomicUsize::new(0)),
            inner: RecordingProcessor::new(),
        }
    }

    /// Lets `n` pending or future `process` calls proceed.
    pub fn release(&self, n: usize) {
        self.gate.add_permits(n);
    }

    /// Number of `process` calls entered so far, including stalled ones.
    pub fn entered(&self) -> usize {
        self.entered.load(Ordering::Acquire)
    }

    /// Waits until at least `n` `process` calls have been entered.
    pub async fn wait_until_entered(&self, n: usize, timeout: Duration) {
        let deadline = Instant::now() + timeout;
        while self.entered() < n {
            if Instant::now() >= deadline {
                panic!("timed out waiting for {n} process calls, got {}", self.entered());
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    }

    pub fn recorder(&self) -> &RecordingProcessor<T> {
        &self.inner
    }
}

impl<T> Clone for StallingProcessor<T> {
    fn clone(&self) -> Self {
        Self {
            gate: Arc::clone(&self.gate),
            entered: Arc::clone(&self.entered),
            inner: self.inner.clone(),
        }
    }
}

impl<T> Processor<T> for StallingProcessor<T>
where
    T: Send + 'static,
{
    async fn process(&self, batch: Vec<T>) -> ProcessResult {
        self.entered.fetch_add(1, Ordering::AcqRel);
        let permit = self.gate.acquire().await.expect("gate semaphore closed");
        permit.forget();
        self.inner.process(batch).await
    }
}

/// Processor that panics on batches containing the marker item and records
/// everything else.
pub struct PanickingOn<T> {
    marker: T,
    inner: RecordingProcessor<T>,
}

impl<T> PanickingOn<T> {
    pub fn new(marker: T) -> Self {
        Self {
            marker,
            inner: RecordingProcessor::new(),
        }
    }

    pub fn recorder(&self) -> &RecordingProcessor<T> {
        &self.inner
    }
}

impl<T> Processor<T> for PanickingOn<T>
where
    T: PartialEq + Send + Sync + 'static,
{
    async fn process(&self, batch: Vec<T>) -> ProcessResult {
        if batch.contains(&self.marker) {
            panic!("poisoned batch");
        }
        self.inner.process(batch).await
    }
}
