//! Bounded multi-producer multi-consumer ingress queue.
//!
//! Producers enqueue without blocking and are told apart whether the queue is
//! at capacity or permanently closed; workers await items and observe closure
//! only after every buffered item has been handed out. That last property is
//! what makes worker-side draining on shutdown safe: closing the queue stops
//! intake while leaving the backlog receivable.

use async_channel::{Receiver, Sender, TrySendError};

/// Reason a non-blocking enqueue was refused. Carries the item back so the
/// producer can retry it.
#[derive(Debug)]
pub(crate) enum EnqueueError<T> {
    /// The queue is at capacity.
    Full(T),
    /// The queue has been closed.
    Closed(T),
}

/// Fixed-capacity FIFO buffer between producers and batch workers.
#[derive(Debug)]
pub(crate) struct IngressQueue<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
    capacity: usize,
}

impl<T> IngressQueue<T> {
    pub(crate) fn new(capacity: usize) -> Self {
        let (tx, rx) = async_channel::bounded(capacity);
        Self { tx, rx, capacity }
    }

    /// Attempts to enqueue without waiting.
    pub(crate) fn try_enqueue(&self, item: T) -> Result<(), EnqueueError<T>> {
        self.tx.try_send(item).map_err(|err| match err {
            TrySendError::Full(item) => EnqueueError::Full(item),
            TrySendError::Closed(item) => EnqueueError::Closed(item),
        })
    }

    /// Waits for the next item.
    ///
    /// Returns `None` only once the queue is closed and empty.
    pub(crate) async fn dequeue(&self) -> Option<T> {
        self.rx.recv().await.ok()
    }

    /// Removes the next item if one is already buffered.
    pub(crate) fn try_dequeue(&self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    /// Closes the queue. Buffered items remain receivable.
    pub(crate) fn close(&self) {
        self.tx.close();
    }

    pub(crate) fn len(&self) -> usize {
        self.rx.len()
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }
}

// Derived Clone would demand `T: Clone`; the channel halves are always
// clonable on their own.
impl<T> Clone for IngressQueue<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            rx: self.rx.clone(),
            capacity: self.capacity,
        }
    }
}
