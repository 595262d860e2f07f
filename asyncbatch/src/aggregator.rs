//! The batch aggregator: public surface and lifecycle controller.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use metrics::counter;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{Instrument, debug, error, info, info_span};

use crate::config::{BatchConfig, ValidationError};
use crate::error::AddError;
use crate::metrics::{ASYNCBATCH_ADD_REJECTIONS_TOTAL, REASON_LABEL, register_metrics};
use crate::processor::Processor;
use crate::queue::{EnqueueError, IngressQueue};
use crate::shutdown::{ShutdownTx, create_shutdown_channel};
use crate::worker::{BatchWorker, FlushTrigger, flush_batch};

/// Lifecycle state of a [`BatchAggregator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LifecycleState {
    /// Accepting items.
    Open = 0,
    /// Shutdown has begun; new items are rejected while buffered ones drain.
    Closing = 1,
    /// All workers have exited and every accepted item has been processed.
    Closed = 2,
}

impl LifecycleState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => LifecycleState::Open,
            1 => LifecycleState::Closing,
            _ => LifecycleState::Closed,
        }
    }

    /// Lowercase name, for logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Open => "open",
            LifecycleState::Closing => "closing",
            LifecycleState::Closed => "closed",
        }
    }
}

/// Lock-free lifecycle cell. Producers read it on every `add`; the shutdown
/// initiator writes it exactly twice.
struct Lifecycle(AtomicU8);

impl Lifecycle {
    fn new() -> Self {
        Self(AtomicU8::new(LifecycleState::Open as u8))
    }

    fn load(&self) -> LifecycleState {
        LifecycleState::from_u8(self.0.load(Ordering::Acquire))
    }

    fn begin_close(&self) -> bool {
        self.0
            .compare_exchange(
                LifecycleState::Open as u8,
                LifecycleState::Closing as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    fn finish_close(&self) {
        self.0
            .store(LifecycleState::Closed as u8, Ordering::Release);
    }
}

/// Groups individually submitted items into size- and latency-bounded
/// batches and hands them to a [`Processor`] from a pool of workers.
///
/// Producers submit through [`add`](Self::add), which never blocks: when the
/// bounded ingress queue is full the item comes straight back as
/// [`AddError::Full`] and the producer chooses its own backoff. Workers pull
/// from the shared queue, so items from one producer keep their relative
/// order within a worker but not across workers.
///
/// [`shutdown`](Self::shutdown) drains every accepted item before returning.
/// Dropping the aggregator without shutting it down aborts the workers and
/// loses whatever they had buffered.
pub struct BatchAggregator<T, P> {
    config: Arc<BatchConfig>,
    queue: IngressQueue<T>,
    processor: Arc<P>,
    lifecycle: Lifecycle,
    shutdown_tx: ShutdownTx,
    workers: Mutex<Option<JoinSet<()>>>,
}

impl<T, P> BatchAggregator<T, P>
where
    T: Send + 'static,
    P: Processor<T>,
{
    /// Validates `config`, then starts the worker pool.
    ///
    /// Must be called from within a tokio runtime; the workers are spawned
    /// immediately.
    pub fn new(config: BatchConfig, processor: P) -> Result<Self, ValidationError> {
        config.validate()?;
        register_metrics();

        let config = Arc::new(config);
        let processor = Arc::new(processor);
        let queue = IngressQueue::new(config.queue_capacity());
        let (shutdown_tx, shutdown_rx) = create_shutdown_channel();

        let mut workers = JoinSet::new();
        for worker_id in 0..config.num_workers {
            let worker = BatchWorker::new(
                Arc::clone(&config),
                queue.clone(),
                Arc::clone(&processor),
                shutdown_rx.clone(),
            );
            workers.spawn(worker.run().instrument(info_span!("batch_worker", worker_id)));
        }

        info!(
            num_workers = config.num_workers,
            max_size = config.max_size,
            queue_capacity = config.queue_capacity(),
            "started batch aggregator"
        );

        Ok(Self {
            config,
            queue,
            processor,
            lifecycle: Lifecycle::new(),
            shutdown_tx,
            workers: Mutex::new(Some(workers)),
        })
    }

    /// Submits one item.
    ///
    /// Never blocks and never yields. The item is returned inside the error
    /// when the aggregator is shut down ([`AddError::Closed`]) or the ingress
    /// queue is at capacity ([`AddError::Full`]).
    pub fn add(&self, item: T) -> Result<(), AddError<T>> {
        if self.lifecycle.load() != LifecycleState::Open {
            counter!(ASYNCBATCH_ADD_REJECTIONS_TOTAL, REASON_LABEL => "closed").increment(1);
            return Err(AddError::Closed(item));
        }

        self.queue.try_enqueue(item).map_err(|err| match err {
            EnqueueError::Full(item) => {
                counter!(ASYNCBATCH_ADD_REJECTIONS_TOTAL, REASON_LABEL => "full").increment(1);
                AddError::Full(item)
            }
            // The lifecycle check raced with a concurrent shutdown.
            EnqueueError::Closed(item) => {
                counter!(ASYNCBATCH_ADD_REJECTIONS_TOTAL, REASON_LABEL => "closed").increment(1);
                AddError::Closed(item)
            }
        })
    }

    /// Gracefully stops the aggregator.
    ///
    /// New submissions are rejected from the moment this is called. Every
    /// item accepted beforehand is processed before this method returns:
    /// workers drain the queue, flush their partial batches and exit, and a
    /// final sweep rescues anything a crashed worker might have left behind.
    ///
    /// Idempotent. Concurrent callers all return only once the drain has
    /// completed.
    pub async fn shutdown(&self) {
        // Reject new submissions from the instant shutdown is requested,
        // even while a concurrent caller holds the drain lock.
        self.lifecycle.begin_close();

        let mut workers_guard = self.workers.lock().await;
        let Some(mut workers) = workers_guard.take() else {
            debug!("batch aggregator already shut down");
            return;
        };

        info!("shutting down batch aggregator");

        // Stop intake before signaling so the queue can only shrink from
        // here on; buffered items stay receivable for the drain.
        self.queue.close();
        self.shutdown_tx.signal();

        while let Some(joined) = workers.join_next().await {
            if let Err(err) = joined {
                if err.is_panic() {
                    error!(error = %err, "batch worker panicked");
                } else {
                    debug!("batch worker cancelled");
                }
            }
        }

        // Workers drain before exiting; anything left here means a worker
        // died early.
        self.sweep_residual().await;

        self.lifecycle.finish_close();
        info!("batch aggregator stopped");
    }

    /// Processes items a crashed worker failed to drain, one `max_size`
    /// chunk at a time.
    async fn sweep_residual(&self) {
        let max_size = self.config.max_size;
        let mut batch = Vec::with_capacity(max_size);

        while let Some(item) = self.queue.try_dequeue() {
            batch.push(item);
            if batch.len() >= max_size {
                flush_batch(self.processor.as_ref(), &mut batch, FlushTrigger::Shutdown).await;
            }
        }

        flush_batch(self.processor.as_ref(), &mut batch, FlushTrigger::Shutdown).await;
    }

    /// Maximum number of items per batch.
    pub fn max_size(&self) -> usize {
        self.config.max_size
    }

    /// Configured lower ratio.
    pub fn lower_ratio(&self) -> f64 {
        self.config.lower_ratio
    }

    /// Batch size at which a probe expiry flushes early.
    pub fn lower_threshold(&self) -> usize {
        self.config.lower_threshold()
    }

    /// Short probe wait.
    pub fn fixed_wait(&self) -> Duration {
        self.config.fixed_wait()
    }

    /// Long deadline for underfilled batches.
    pub fn underfilled_wait(&self) -> Duration {
        self.config.underfilled_wait()
    }

    /// Number of batch workers.
    pub fn num_workers(&self) -> usize {
        self.config.num_workers
    }

    /// Capacity of the ingress queue.
    pub fn queue_capacity(&self) -> usize {
        self.queue.capacity()
    }

    /// Number of items currently buffered in the ingress queue.
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LifecycleState {
        self.lifecycle.load()
    }
}

impl<T, P> fmt::Debug for BatchAggregator<T, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchAggregator")
            .field("config", &self.config)
            .field("state", &self.lifecycle.load().as_str())
            .field("queue_len", &self.queue.len())
            .finish()
    }
}
