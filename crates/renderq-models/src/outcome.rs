//! Terminal task outcomes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::TaskId;

/// Outcome kind, used as a log field and metric label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Completed,
    Cancelled,
    RenderFailed,
    FetchFailed,
    MalformedTask,
}

impl OutcomeKind {
    pub const ALL: [OutcomeKind; 5] = [
        OutcomeKind::Completed,
        OutcomeKind::Cancelled,
        OutcomeKind::RenderFailed,
        OutcomeKind::FetchFailed,
        OutcomeKind::MalformedTask,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeKind::Completed => "completed",
            OutcomeKind::Cancelled => "cancelled",
            OutcomeKind::RenderFailed => "render_failed",
            OutcomeKind::FetchFailed => "fetch_failed",
            OutcomeKind::MalformedTask => "malformed_task",
        }
    }
}

impl fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal result of processing one task.
///
/// Every variant is final: the queue message is acknowledged whatever the
/// outcome, and nothing is retried by redelivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TaskOutcome {
    /// Render engine exited with status zero.
    Completed,
    /// Shutdown was requested before or during the render.
    Cancelled,
    /// Render engine exited non-zero, timed out, or could not be launched.
    RenderFailed {
        exit_code: Option<i32>,
        stderr: String,
    },
    /// The source asset could not be retrieved.
    FetchFailed { message: String },
    /// The message body is not a valid task.
    MalformedTask { message: String },
}

impl TaskOutcome {
    pub fn kind(&self) -> OutcomeKind {
        match self {
            TaskOutcome::Completed => OutcomeKind::Completed,
            TaskOutcome::Cancelled => OutcomeKind::Cancelled,
            TaskOutcome::RenderFailed { .. } => OutcomeKind::RenderFailed,
            TaskOutcome::FetchFailed { .. } => OutcomeKind::FetchFailed,
            TaskOutcome::MalformedTask { .. } => OutcomeKind::MalformedTask,
        }
    }

    /// Diagnostic text for failure outcomes.
    pub fn diagnostic(&self) -> Option<&str> {
        match self {
            TaskOutcome::RenderFailed { stderr, .. } => Some(stderr),
            TaskOutcome::FetchFailed { message } | TaskOutcome::MalformedTask { message } => {
                Some(message)
            }
            TaskOutcome::Completed | TaskOutcome::Cancelled => None,
        }
    }
}

/// What the processor hands back to the poll loop for one message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskReport {
    pub task_id: TaskId,
    pub outcome: TaskOutcome,
    pub received_at: DateTime<Utc>,
    #[serde(with = "duration_ms")]
    pub elapsed: Duration,
}

impl TaskReport {
    pub fn kind(&self) -> OutcomeKind {
        self.outcome.kind()
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        let failed = TaskOutcome::RenderFailed {
            exit_code: Some(1),
            stderr: "Error: file not found".to_string(),
        };
        assert_eq!(failed.kind(), OutcomeKind::RenderFailed);
        assert_eq!(failed.diagnostic(), Some("Error: file not found"));

        let fetch = TaskOutcome::FetchFailed {
            message: "HTTP 404".to_string(),
        };
        assert_eq!(fetch.diagnostic(), Some("HTTP 404"));
        assert_eq!(TaskOutcome::Completed.diagnostic(), None);
        assert_eq!(TaskOutcome::Cancelled.diagnostic(), None);
    }

    #[test]
    fn test_report_serializes_outcome_tag() {
        let report = TaskReport {
            task_id: TaskId::from_string("abc"),
            outcome: TaskOutcome::FetchFailed {
                message: "404".to_string(),
            },
            received_at: Utc::now(),
            elapsed: Duration::from_millis(1500),
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["outcome"]["outcome"], "fetch_failed");
        assert_eq!(json["elapsed"], 1500);
        assert_eq!(json["task_id"], "abc");
    }
}
