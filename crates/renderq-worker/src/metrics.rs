//! Prometheus metrics for the worker.

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use renderq_models::OutcomeKind;

use crate::error::{WorkerError, WorkerResult};

/// Metric names as constants for consistency.
pub mod names {
    pub const TASKS_TOTAL: &str = "renderq_tasks_total";
    pub const TASK_DURATION_SECONDS: &str = "renderq_task_duration_seconds";
    pub const MESSAGES_DELETED_TOTAL: &str = "renderq_messages_deleted_total";
    pub const QUEUE_ERRORS_TOTAL: &str = "renderq_queue_errors_total";
}

/// Serve `/metrics` on `addr`.
///
/// Without an installed recorder every `record_*` call is a no-op.
pub fn install_exporter(addr: SocketAddr) -> WorkerResult<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| WorkerError::Metrics(e.to_string()))
}

/// Record one processed task.
pub fn record_outcome(kind: OutcomeKind, elapsed: Duration) {
    let labels = [("outcome", kind.as_str().to_string())];
    counter!(names::TASKS_TOTAL, &labels).increment(1);
    histogram!(names::TASK_DURATION_SECONDS, &labels).record(elapsed.as_secs_f64());
}

/// Record an acknowledged message.
pub fn record_deleted() {
    counter!(names::MESSAGES_DELETED_TOTAL).increment(1);
}

/// Record a failed queue call; `operation` is `receive` or `delete`.
pub fn record_queue_error(operation: &str) {
    let labels = [("operation", operation.to_string())];
    counter!(names::QUEUE_ERRORS_TOTAL, &labels).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_names() {
        assert!(names::TASKS_TOTAL.starts_with("renderq_"));
        assert!(names::TASK_DURATION_SECONDS.ends_with("_seconds"));
    }

    #[test]
    fn test_record_without_recorder() {
        for kind in OutcomeKind::ALL {
            record_outcome(kind, Duration::from_millis(5));
        }
        record_deleted();
        record_queue_error("receive");
    }
}
