//! Contract between the aggregator and the user-supplied batch consumer.

use std::future::Future;
use std::{error, fmt};

/// Type alias for results returned by [`Processor::process`].
pub type ProcessResult = Result<(), ProcessError>;

/// Failure surfaced by a [`Processor`].
///
/// The aggregator consumes this only for logging and metrics; it does not
/// retry the batch and never propagates the failure to producers.
pub struct ProcessError(Box<dyn error::Error + Send + Sync>);

impl ProcessError {
    /// Wraps any error as a processing failure.
    pub fn new<E>(source: E) -> Self
    where
        E: Into<Box<dyn error::Error + Send + Sync>>,
    {
        Self(source.into())
    }
}

impl fmt::Debug for ProcessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ProcessError").field(&self.0).finish()
    }
}

impl fmt::Display for ProcessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl error::Error for ProcessError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        Some(self.0.as_ref())
    }
}

/// Trait for consumers that receive aggregated batches.
///
/// Every batch handed to [`process`](Self::process) is non-empty, holds at
/// most `max_size` items, and preserves the order in which the delivering
/// worker received them. Implementations are shared by all workers and must
/// therefore tolerate concurrent calls when the aggregator runs more than
/// one worker.
///
/// A plain async closure works too: any `Fn(Vec<T>) -> impl Future` with the
/// right output type implements this trait through the blanket impl below.
pub trait Processor<T>: Send + Sync + 'static {
    /// Consumes one batch.
    fn process(&self, batch: Vec<T>) -> impl Future<Output = ProcessResult> + Send;
}

impl<T, F, Fut> Processor<T> for F
where
    F: Fn(Vec<T>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ProcessResult> + Send,
{
    fn process(&self, batch: Vec<T>) -> impl Future<Output = ProcessResult> + Send {
        self(batch)
    }
}
