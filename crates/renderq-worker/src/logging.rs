//! Structured task logging utilities.
//!
//! Provides consistent, structured logging for task processing with
//! tracing spans and contextual information.

use renderq_models::{TaskId, TaskOutcome};
use tracing::{error, info, warn, Span};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "renderq=info,aws_config=warn,aws_smithy_runtime=warn";

/// Initialize tracing: JSON when `LOG_FORMAT=json`, coloured text otherwise.
pub fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
}

/// Task logger for structured logging with consistent formatting.
///
/// Every line carries the task ID and operation so one task's lifecycle
/// can be followed across the fetch and render stages.
#[derive(Debug, Clone)]
pub struct TaskLogger {
    task_id: String,
    operation: String,
}

impl TaskLogger {
    /// Create a new task logger for a specific task and operation.
    pub fn new(task_id: &TaskId, operation: &str) -> Self {
        Self {
            task_id: task_id.to_string(),
            operation: operation.to_string(),
        }
    }

    /// Log the start of a task operation.
    pub fn log_start(&self, message: &str) {
        info!(
            task_id = %self.task_id,
            operation = %self.operation,
            "Task started: {}", message
        );
    }

    /// Log a progress update during task execution.
    pub fn log_progress(&self, message: &str) {
        info!(
            task_id = %self.task_id,
            operation = %self.operation,
            "Task progress: {}", message
        );
    }

    /// Log a warning during task execution.
    pub fn log_warning(&self, message: &str) {
        warn!(
            task_id = %self.task_id,
            operation = %self.operation,
            "Task warning: {}", message
        );
    }

    /// Log the terminal outcome, with diagnostics for failures.
    pub fn log_outcome(&self, outcome: &TaskOutcome) {
        let kind = outcome.kind();
        let exit_code = match outcome {
            TaskOutcome::RenderFailed { exit_code, .. } => *exit_code,
            _ => None,
        };
        match outcome.diagnostic() {
            None if matches!(outcome, TaskOutcome::Cancelled) => warn!(
                task_id = %self.task_id,
                operation = %self.operation,
                outcome = %kind,
                "Task cancelled by shutdown"
            ),
            None => info!(
                task_id = %self.task_id,
                operation = %self.operation,
                outcome = %kind,
                "Task completed"
            ),
            Some(diagnostic) => error!(
                task_id = %self.task_id,
                operation = %self.operation,
                outcome = %kind,
                exit_code = ?exit_code,
                "Task failed: {}", diagnostic.trim()
            ),
        }
    }

    /// Get the task ID.
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Get the operation type.
    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Create a tracing span for this task.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "task",
            task_id = %self.task_id,
            operation = %self.operation
        )
    }
}
