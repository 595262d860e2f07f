use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};

static REGISTER_METRICS: Once = Once::new();

pub const ASYNCBATCH_BATCHES_FLUSHED_TOTAL: &str = "asyncbatch_batches_flushed_total";
pub const ASYNCBATCH_ITEMS_PROCESSED_TOTAL: &str = "asyncbatch_items_processed_total";
pub const ASYNCBATCH_PROCESS_FAILURES_TOTAL: &str = "asyncbatch_process_failures_total";
pub const ASYNCBATCH_ADD_REJECTIONS_TOTAL: &str = "asyncbatch_add_rejections_total";
pub const ASYNCBATCH_FLUSH_DURATION_MILLISECONDS: &str = "asyncbatch_flush_duration_milliseconds";
pub const ASYNCBATCH_WORKERS_ACTIVE: &str = "asyncbatch_workers_active";

/// Label key for what triggered a flush ("size", "fixed_wait", ...).
pub const TRIGGER_LABEL: &str = "trigger";
/// Label key for why an `add` was rejected ("full" or "closed").
pub const REASON_LABEL: &str = "reason";

/// Registers the metrics emitted by this crate. Called on aggregator
/// construction; safe to call any number of times, registration happens once.
pub(crate) fn register_metrics() {
    REGISTER_METRICS.call_once(|| {
        describe_counter!(
            ASYNCBATCH_BATCHES_FLUSHED_TOTAL,
            Unit::Count,
            "Total number of batches handed to the processor"
        );

        describe_counter!(
            ASYNCBATCH_ITEMS_PROCESSED_TOTAL,
            Unit::Count,
            "Total number of items handed to the processor across all batches"
        );

        describe_counter!(
            ASYNCBATCH_PROCESS_FAILURES_TOTAL,
            Unit::Count,
            "Total number of batches whose processor call returned an error or panicked"
        );

        describe_counter!(
            ASYNCBATCH_ADD_REJECTIONS_TOTAL,
            Unit::Count,
            "Total number of submissions rejected at the ingress queue"
        );

        describe_histogram!(
            ASYNCBATCH_FLUSH_DURATION_MILLISECONDS,
            Unit::Milliseconds,
            "Time taken in milliseconds by a single processor call"
        );

        describe_gauge!(
            ASYNCBATCH_WORKERS_ACTIVE,
            Unit::Count,
            "Number of batch workers currently running"
        );
    });
}
