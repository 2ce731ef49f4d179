//! Poll loop: receive, process, acknowledge.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use renderq_models::{OutcomeKind, ShutdownSignal};
use renderq_queue::MessageQueue;
use tracing::{debug, error, info, warn};

use crate::error::WorkerResult;
use crate::metrics;
use crate::processor::TaskProcessor;

/// Default long-poll wait per receive.
pub const DEFAULT_RECEIVE_WAIT: Duration = Duration::from_secs(10);
/// Default pause between iterations.
pub const DEFAULT_IDLE_DELAY: Duration = Duration::from_secs(1);

/// Counters for one run of the poll loop.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollStats {
    pub received: u64,
    pub deleted: u64,
    outcomes: HashMap<OutcomeKind, u64>,
}

impl PollStats {
    /// How many tasks ended with `kind`.
    pub fn count(&self, kind: OutcomeKind) -> u64 {
        self.outcomes.get(&kind).copied().unwrap_or(0)
    }

    /// Tasks that reached a terminal outcome.
    pub fn processed(&self) -> u64 {
        self.outcomes.values().sum()
    }

    fn record(&mut self, kind: OutcomeKind) {
        *self.outcomes.entry(kind).or_insert(0) += 1;
    }
}

/// Drives the worker: one message at a time, in delivery order, until shutdown.
pub struct PollLoop {
    queue: Arc<dyn MessageQueue>,
    processor: TaskProcessor,
    shutdown: ShutdownSignal,
    receive_wait: Duration,
    idle_delay: Duration,
}

impl PollLoop {
    pub fn new(
        queue: Arc<dyn MessageQueue>,
        processor: TaskProcessor,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            queue,
            processor,
            shutdown,
            receive_wait: DEFAULT_RECEIVE_WAIT,
            idle_delay: DEFAULT_IDLE_DELAY,
        }
    }

    pub fn with_receive_wait(mut self, wait: Duration) -> Self {
        self.receive_wait = wait;
        self
    }

    pub fn with_idle_delay(mut self, delay: Duration) -> Self {
        self.idle_delay = delay;
        self
    }

    /// Run until shutdown is requested.
    ///
    /// Returns `Err` on the first receive or delete failure; the message being
    /// handled at that point is left to the backend's redelivery.
    pub async fn run(&self) -> WorkerResult<PollStats> {
        info!(
            "Polling {} queue (wait {:?}, idle delay {:?})",
            self.queue.backend(),
            self.receive_wait,
            self.idle_delay
        );

        let mut stats = PollStats::default();

        loop {
            if self.shutdown.is_requested() {
                break;
            }

            let received = tokio::select! {
                received = self.queue.receive(self.receive_wait) => received,
                _ = self.shutdown.cancelled() => {
                    debug!("Shutdown requested while waiting for messages");
                    break;
                }
            };

            let message = match received {
                Ok(message) => message,
                Err(e) => {
                    error!("Failed to receive message: {}", e);
                    metrics::record_queue_error("receive");
                    return Err(e.into());
                }
            };

            if let Some(message) = message {
                stats.received += 1;

                if self.shutdown.is_requested() {
                    warn!(
                        message_id = %message.message_id,
                        "Shutdown requested before dispatch, leaving message for redelivery"
                    );
                    break;
                }

                let report = self
                    .processor
                    .process(message.body.as_deref(), &self.shutdown)
                    .await;
                stats.record(report.kind());

                if let Err(e) = self.queue.delete(&message).await {
                    error!(
                        message_id = %message.message_id,
                        task_id = %report.task_id,
                        "Failed to delete message: {}", e
                    );
                    metrics::record_queue_error("delete");
                    return Err(e.into());
                }
                stats.deleted += 1;
                metrics::record_deleted();

                debug!(
                    message_id = %message.message_id,
                    task_id = %report.task_id,
                    outcome = %report.kind(),
                    elapsed_ms = report.elapsed.as_millis() as u64,
                    "Message acknowledged"
                );
            }

            tokio::select! {
                _ = tokio::time::sleep(self.idle_delay) => {}
                _ = self.shutdown.cancelled() => break,
            }
        }

        info!(
            received = stats.received,
            deleted = stats.deleted,
            processed = stats.processed(),
            "Poll loop stopped"
        );
        Ok(stats)
    }
}
