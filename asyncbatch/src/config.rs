//! Aggregator configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Configuration validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A field value violates its documented constraint.
    #[error("invalid value for `{field}`: {constraint}")]
    InvalidFieldValue {
        field: &'static str,
        constraint: &'static str,
    },
}

/// Batching configuration for a [`BatchAggregator`](crate::BatchAggregator).
///
/// All fields are optional in serialized form and fall back to the
/// `DEFAULT_*` constants. Wait times are stored in milliseconds and exposed
/// as [`Duration`] through the accessor methods. Setters consume and return
/// `self` so options compose in order; validation happens once, when the
/// aggregator is constructed.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BatchConfig {
    /// Maximum number of items in a batch. Batches that reach this size are
    /// flushed immediately, without consulting timers.
    #[serde(default = "default_max_size")]
    pub max_size: usize,
    /// Fraction of `max_size` above which a batch is considered worth
    /// flushing when the short probe wait expires.
    #[serde(default = "default_lower_ratio")]
    pub lower_ratio: f64,
    /// Short probe wait, in milliseconds, granted to ingress bursts.
    #[serde(default = "default_fixed_wait_ms")]
    pub fixed_wait_ms: u64,
    /// Long deadline, in milliseconds, after which an underfilled batch is
    /// released regardless of size.
    #[serde(default = "default_underfilled_wait_ms")]
    pub underfilled_wait_ms: u64,
    /// Number of concurrent batch workers sharing the ingress queue.
    #[serde(default = "default_num_workers")]
    pub num_workers: usize,
    /// Ingress queue capacity. When absent it is derived as
    /// `max(max_size * num_workers * 2, max_size * 2)`.
    #[serde(default)]
    pub queue_capacity: Option<usize>,
}

impl BatchConfig {
    /// Default maximum batch size.
    pub const DEFAULT_MAX_SIZE: usize = 1000;

    /// Default lower ratio.
    pub const DEFAULT_LOWER_RATIO: f64 = 0.1;

    /// Default probe wait in milliseconds.
    pub const DEFAULT_FIXED_WAIT_MS: u64 = 5;

    /// Default underfilled deadline in milliseconds.
    pub const DEFAULT_UNDERFILLED_WAIT_MS: u64 = 20;

    /// Default worker count.
    pub const DEFAULT_NUM_WORKERS: usize = 1;

    /// Upper bound on `num_workers`, matching the intended CPU locality of
    /// the worker pool.
    pub const MAX_NUM_WORKERS: usize = 8;

    /// Returns a configuration with every field at its default.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum batch size.
    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    /// Sets the lower ratio.
    pub fn with_lower_ratio(mut self, lower_ratio: f64) -> Self {
        self.lower_ratio = lower_ratio;
        self
    }

    /// Sets the probe wait. Sub-millisecond durations truncate to zero and
    /// are rejected by [`validate`](Self::validate).
    pub fn with_fixed_wait(mut self, wait: Duration) -> Self {
        self.fixed_wait_ms = wait.as_millis() as u64;
        self
    }

    /// Sets the underfilled deadline.
    pub fn with_underfilled_wait(mut self, wait: Duration) -> Self {
        self.underfilled_wait_ms = wait.as_millis() as u64;
        self
    }

    /// Sets the worker count.
    pub fn with_num_workers(mut self, num_workers: usize) -> Self {
        self.num_workers = num_workers;
        self
    }

    /// Overrides the derived ingress queue capacity.
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = Some(capacity);
        self
    }

    /// Probe wait as a [`Duration`].
    pub fn fixed_wait(&self) -> Duration {
        Duration::from_millis(self.fixed_wait_ms)
    }

    /// Underfilled deadline as a [`Duration`].
    pub fn underfilled_wait(&self) -> Duration {
        Duration::from_millis(self.underfilled_wait_ms)
    }

    /// Batch size above which a probe expiry flushes early, never below 1.
    pub fn lower_threshold(&self) -> usize {
        ((self.max_size as f64 * self.lower_ratio).floor() as usize).max(1)
    }

    /// Effective ingress queue capacity.
    ///
    /// The derived value keeps every worker supplied with two full batches
    /// while still exerting backpressure on producers.
    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
            .unwrap_or_else(|| (self.max_size * self.num_workers * 2).max(self.max_size * 2))
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_size == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "max_size",
                constraint: "must be greater than 0",
            });
        }

        if !(self.lower_ratio > 0.0 && self.lower_ratio <= 1.0) {
            return Err(ValidationError::InvalidFieldValue {
                field: "lower_ratio",
                constraint: "must be within (0, 1]",
            });
        }

        if self.fixed_wait_ms == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "fixed_wait_ms",
                constraint: "must be greater than 0",
            });
        }

        if self.fixed_wait_ms >= self.underfilled_wait_ms {
            return Err(ValidationError::InvalidFieldValue {
                field: "fixed_wait_ms",
                constraint: "must be less than underfilled_wait_ms",
            });
        }

        if self.num_workers < 1 || self.num_workers > Self::MAX_NUM_WORKERS {
            return Err(ValidationError::InvalidFieldValue {
                field: "num_workers",
                constraint: "must be between 1 and 8",
            });
        }

        if let Some(capacity) = self.queue_capacity
            && capacity < self.max_size * self.num_workers * 2
        {
            return Err(ValidationError::InvalidFieldValue {
                field: "queue_capacity",
                constraint: "must be at least max_size * num_workers * 2",
            });
        }

        Ok(())
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_size: default_max_size(),
            lower_ratio: default_lower_ratio(),
            fixed_wait_ms: default_fixed_wait_ms(),
            underfilled_wait_ms: default_underfilled_wait_ms(),
            num_workers: default_num_workers(),
            queue_capacity: None,
        }
    }
}

fn default_max_size() -> usize {
    BatchConfig::DEFAULT_MAX_SIZE
}

fn default_lower_ratio() -> f64 {
    BatchConfig::DEFAULT_LOWER_RATIO
}

fn default_fixed_wait_ms() -> u64 {
    BatchConfig::DEFAULT_FIXED_WAIT_MS
}

fn default_underfilled_wait_ms() -> u64 {
    BatchConfig::DEFAULT_UNDERFILLED_WAIT_MS
}

fn default_num_workers() -> usize {
    BatchConfig::DEFAULT_NUM_WORKERS
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field_of(err: ValidationError) -> &'static str {
        let ValidationError::InvalidFieldValue { field, .. } = err;
        field
    }

    #[test]
    fn defaults_are_valid() {
        let config = BatchConfig::default();

        config.validate().unwrap();
        assert_eq!(config.max_size, 1000);
        assert_eq!(config.lower_ratio, 0.1);
        assert_eq!(config.fixed_wait(), Duration::from_millis(5));
        assert_eq!(config.underfilled_wait(), Duration::from_millis(20));
        assert_eq!(config.num_workers, 1);
    }

    #[test]
    fn setters_compose_in_order() {
        let config = BatchConfig::new()
            .with_max_size(50)
            .with_lower_ratio(0.2)
            .with_fixed_wait(Duration::from_millis(100))
            .with_underfilled_wait(Duration::from_millis(500))
            .with_num_workers(2)
            .with_num_workers(4);

        config.validate().unwrap();
        assert_eq!(config.max_size, 50);
        assert_eq!(config.lower_threshold(), 10);
        assert_eq!(config.num_workers, 4);
    }

    #[test]
    fn rejects_zero_max_size() {
        let err = BatchConfig::new().with_max_size(0).validate().unwrap_err();
        assert_eq!(field_of(err), "max_size");
    }

    #[test]
    fn rejects_out_of_range_lower_ratio() {
        for ratio in [0.0, -0.5, 1.5, f64::NAN] {
            let err = BatchConfig::new()
                .with_lower_ratio(ratio)
                .validate()
                .unwrap_err();
            assert_eq!(field_of(err), "lower_ratio");
        }
    }

    #[test]
    fn rejects_probe_wait_not_below_deadline() {
        let err = BatchConfig::new()
            .with_fixed_wait(Duration::from_millis(500))
            .with_underfilled_wait(Duration::from_millis(100))
            .validate()
            .unwrap_err();
        assert_eq!(field_of(err), "fixed_wait_ms");
    }

    #[test]
    fn rejects_zero_probe_wait() {
        let err = BatchConfig::new()
            .with_fixed_wait(Duration::from_micros(100))
            .validate()
            .unwrap_err();
        assert_eq!(field_of(err), "fixed_wait_ms");
    }

    #[test]
    fn rejects_worker_count_outside_limits() {
        for workers in [0, 9] {
            let err = BatchConfig::new()
                .with_num_workers(workers)
                .validate()
                .unwrap_err();
            assert_eq!(field_of(err), "num_workers");
        }
    }

    #[test]
    fn rejects_undersized_explicit_queue_capacity() {
        let err = BatchConfig::new()
            .with_max_size(10)
            .with_num_workers(2)
            .with_queue_capacity(39)
            .validate()
            .unwrap_err();
        assert_eq!(field_of(err), "queue_capacity");
    }

    #[test]
    fn lower_threshold_floors_and_never_drops_below_one() {
        assert_eq!(BatchConfig::new().with_max_size(10).lower_threshold(), 1);
        assert_eq!(
            BatchConfig::new()
                .with_max_size(10)
                .with_lower_ratio(0.35)
                .lower_threshold(),
            3
        );
        assert_eq!(
            BatchConfig::new()
                .with_max_size(1000)
                .with_lower_ratio(0.001)
                .lower_threshold(),
            1
        );
    }

    #[test]
    fn queue_capacity_is_derived_unless_overridden() {
        let derived = BatchConfig::new().with_max_size(10).with_num_workers(4);
        assert_eq!(derived.queue_capacity(), 80);

        // The floor of two batches applies to single-worker setups as well.
        let single = BatchConfig::new().with_max_size(10);
        assert_eq!(single.queue_capacity(), 20);

        let explicit = derived.with_queue_capacity(100);
        assert_eq!(explicit.queue_capacity(), 100);
    }

    #[test]
    fn deserializes_with_partial_fields() {
        let config: BatchConfig = serde_json::from_str(r#"{"max_size": 6}"#).unwrap();

        assert_eq!(config.max_size, 6);
        assert_eq!(config.num_workers, BatchConfig::DEFAULT_NUM_WORKERS);
        assert_eq!(config.queue_capacity, None);
        config.validate().unwrap();
    }
}
