//! Batch assembly worker.
//!
//! Each worker owns a reusable batch buffer and a single timer, and runs a
//! three-way select over the shutdown signal, the shared ingress queue and
//! timer expiry. Shutdown is checked first so a signaled worker switches to
//! draining instead of waiting out its deadline. The timer is a single
//! pinned sleep that is reset in place rather than reallocated per batch.

use std::mem;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use metrics::{counter, gauge, histogram};
use tokio::time::{Instant, sleep_until};
use tracing::{debug, error, info};

use crate::config::BatchConfig;
use crate::metrics::{
    ASYNCBATCH_BATCHES_FLUSHED_TOTAL, ASYNCBATCH_FLUSH_DURATION_MILLISECONDS,
    ASYNCBATCH_ITEMS_PROCESSED_TOTAL, ASYNCBATCH_PROCESS_FAILURES_TOTAL,
    ASYNCBATCH_WORKERS_ACTIVE, TRIGGER_LABEL,
};
use crate::policy::{self, ArrivalAction, ExpiryAction, TimerPhase};
use crate::processor::Processor;
use crate::queue::IngressQueue;
use crate::shutdown::ShutdownRx;

/// What caused a batch to be handed to the processor. Used for logs and
/// metric labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FlushTrigger {
    /// The batch reached `max_size`.
    Size,
    /// The short probe wait expired at or above the lower threshold.
    FixedWait,
    /// The long deadline expired.
    UnderfilledWait,
    /// The shutdown drain released the batch.
    Shutdown,
    /// The ingress queue closed and emptied out.
    QueueClosed,
}

impl FlushTrigger {
    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            FlushTrigger::Size => "size",
            FlushTrigger::FixedWait => "fixed_wait",
            FlushTrigger::UnderfilledWait => "underfilled_wait",
            FlushTrigger::Shutdown => "shutdown",
            FlushTrigger::QueueClosed => "queue_closed",
        }
    }
}

/// One concurrent consumer of the ingress queue.
pub(crate) struct BatchWorker<T, P> {
    config: Arc<BatchConfig>,
    queue: IngressQueue<T>,
    processor: Arc<P>,
    shutdown_rx: ShutdownRx,
}

impl<T, P> BatchWorker<T, P>
where
    T: Send + 'static,
    P: Processor<T>,
{
    pub(crate) fn new(
        config: Arc<BatchConfig>,
        queue: IngressQueue<T>,
        processor: Arc<P>,
        shutdown_rx: ShutdownRx,
    ) -> Self {
        Self {
            config,
            queue,
            processor,
            shutdown_rx,
        }
    }

    /// Runs the batch assembly loop until shutdown or queue closure.
    pub(crate) async fn run(self) {
        let BatchWorker {
            config,
            queue,
            processor,
            mut shutdown_rx,
        } = self;

        let max_size = config.max_size;
        let lower_threshold = config.lower_threshold();
        let fixed_wait = config.fixed_wait();
        let underfilled_wait = config.underfilled_wait();

        info!(max_size, lower_threshold, "starting batch worker");
        gauge!(ASYNCBATCH_WORKERS_ACTIVE).increment(1.0);

        let mut batch: Vec<T> = Vec::with_capacity(max_size);
        let mut phase = TimerPhase::Fixed;

        // The timer is unarmed while the batch is empty; the completed sleep
        // is simply not polled until an arrival rearms it.
        let mut timer_armed = false;
        let timer = sleep_until(Instant::now());
        tokio::pin!(timer);

        loop {
            // The flush hands its allocation to the processor; grow the fresh
            // buffer back to a full batch before accumulating again.
            if batch.is_empty() {
                batch.reserve_exact(max_size);
            }

            tokio::select! {
                biased;

                _ = shutdown_rx.wait_for_shutdown() => {
                    drain_queue(&queue, processor.as_ref(), &mut batch, max_size).await;
                    break;
                }

                item = queue.dequeue() => {
                    let Some(item) = item else {
                        // Closed and empty: release the partial batch and exit.
                        flush_batch(processor.as_ref(), &mut batch, FlushTrigger::QueueClosed).await;
                        break;
                    };

                    batch.push(item);
                    match policy::on_item(batch.len(), max_size, phase) {
                        ArrivalAction::FlushNow => {
                            flush_batch(processor.as_ref(), &mut batch, FlushTrigger::Size).await;
                            phase = TimerPhase::Fixed;
                            timer_armed = false;
                        }
                        ArrivalAction::RestartFixedTimer => {
                            timer.as_mut().reset(Instant::now() + fixed_wait);
                            timer_armed = true;
                        }
                        ArrivalAction::KeepDeadline => {}
                    }
                }

                _ = timer.as_mut(), if timer_armed => {
                    match policy::on_expiry(batch.len(), lower_threshold, phase) {
                        ExpiryAction::Flush => {
                            let trigger = match phase {
                                TimerPhase::Fixed => FlushTrigger::FixedWait,
                                TimerPhase::Underfilled => FlushTrigger::UnderfilledWait,
                            };
                            flush_batch(processor.as_ref(), &mut batch, trigger).await;
                            phase = TimerPhase::Fixed;
                            timer_armed = false;
                        }
                        ExpiryAction::EnterUnderfilled => {
                            phase = TimerPhase::Underfilled;
                            timer.as_mut().reset(Instant::now() + underfilled_wait);
                        }
                        ExpiryAction::Disarm => {
                            phase = TimerPhase::Fixed;
                            timer_armed = false;
                        }
                    }
                }
            }
        }

        gauge!(ASYNCBATCH_WORKERS_ACTIVE).decrement(1.0);
        info!("batch worker stopped");
    }
}

/// Synchronously empties the queue after a shutdown signal, flushing every
/// full chunk and then the remainder.
async fn drain_queue<T, P>(
    queue: &IngressQueue<T>,
    processor: &P,
    batch: &mut Vec<T>,
    max_size: usize,
) where
    P: Processor<T>,
{
    debug!(backlog = queue.len(), "draining ingress queue before exit");

    while let Some(item) = queue.try_dequeue() {
        batch.push(item);
        if batch.len() >= max_size {
            flush_batch(processor, batch, FlushTrigger::Shutdown).await;
        }
    }

    flush_batch(processor, batch, FlushTrigger::Shutdown).await;
}

/// Hands the current batch to the processor and recycles the buffer.
///
/// Failures are logged and swallowed: a broken or panicking processor must
/// not take the worker down with it, and producers have no visibility into
/// downstream processing anyway.
pub(crate) async fn flush_batch<T, P>(processor: &P, batch: &mut Vec<T>, trigger: FlushTrigger)
where
    P: Processor<T>,
{
    if batch.is_empty() {
        return;
    }

    let items = mem::take(batch);
    let batch_len = items.len();

    let started = Instant::now();
    let outcome = AssertUnwindSafe(processor.process(items)).catch_unwind().await;
    let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

    histogram!(ASYNCBATCH_FLUSH_DURATION_MILLISECONDS).record(elapsed_ms);
    counter!(ASYNCBATCH_BATCHES_FLUSHED_TOTAL, TRIGGER_LABEL => trigger.as_str()).increment(1);
    counter!(ASYNCBATCH_ITEMS_PROCESSED_TOTAL).increment(batch_len as u64);

    match outcome {
        Ok(Ok(())) => {
            debug!(batch_len, trigger = trigger.as_str(), "flushed batch");
        }
        Ok(Err(err)) => {
            counter!(ASYNCBATCH_PROCESS_FAILURES_TOTAL).increment(1);
            error!(error = %err, batch_len, "batch processor returned an error");
        }
        Err(_) => {
            counter!(ASYNCBATCH_PROCESS_FAILURES_TOTAL).increment(1);
            error!(batch_len, "batch processor panicked");
        }
    }
}
