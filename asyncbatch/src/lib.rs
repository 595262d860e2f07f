//! Asynchronous batch aggregation for data-pipeline backends.
//!
//! Items submitted concurrently by many producers are grouped into
//! size-bounded batches under latency constraints and handed to a
//! user-supplied [`Processor`] by a pool of workers sharing one bounded
//! ingress queue. A two-phase timing policy balances throughput against
//! latency: a short probe wait gives bursts a chance to fill the batch past
//! a lower threshold, a longer deadline bounds how long a small batch can
//! linger, and full batches bypass timers entirely. Submission is
//! non-blocking (backpressure is an error the producer handles), and
//! shutdown drains every accepted item before returning.
//!
//! # Example
//!
//! ```no_run
//! use asyncbatch::{BatchAggregator, BatchConfig, ProcessResult, Processor};
//! use std::time::Duration;
//!
//! struct LogSink;
//!
//! impl Processor<String> for LogSink {
//!     async fn process(&self, batch: Vec<String>) -> ProcessResult {
//!         tracing::info!(batch_len = batch.len(), "writing batch");
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), asyncbatch::ValidationError> {
//!     let config = BatchConfig::new()
//!         .with_max_size(500)
//!         .with_num_workers(2)
//!         .with_fixed_wait(Duration::from_millis(5))
//!         .with_underfilled_wait(Duration::from_millis(20));
//!     let aggregator = BatchAggregator::new(config, LogSink)?;
//!
//!     for record in ["a", "b", "c"] {
//!         if let Err(err) = aggregator.add(record.to_string()) {
//!             tracing::warn!(%err, "submission rejected");
//!         }
//!     }
//!
//!     aggregator.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod aggregator;
pub mod config;
pub mod error;
pub mod metrics;
mod policy;
pub mod processor;
mod queue;
mod shutdown;
mod worker;

pub use aggregator::{BatchAggregator, LifecycleState};
pub use config::{BatchConfig, ValidationError};
pub use error::AddError;
pub use processor::{ProcessError, ProcessResult, Processor};
