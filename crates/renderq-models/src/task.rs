//! Render task definitions and wire body parsing.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use url::Url;
use uuid::Uuid;

/// Unique identifier for a task.
///
/// Generated locally for every received message; never taken from the
/// message itself, so two deliveries of the same body never share scratch files.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
    /// Generate a new random task ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Render mode requested by a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderMode {
    /// A single still frame.
    Image,
    /// A contiguous frame range.
    Animation,
}

impl RenderMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RenderMode::Image => "image",
            RenderMode::Animation => "animation",
        }
    }
}

impl fmt::Display for RenderMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which frames to render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FrameSelection {
    Single { frame: i64 },
    Range { start: i64, end: i64 },
}

impl FrameSelection {
    /// The render mode implied by this selection.
    pub fn mode(&self) -> RenderMode {
        match self {
            FrameSelection::Single { .. } => RenderMode::Image,
            FrameSelection::Range { .. } => RenderMode::Animation,
        }
    }
}

/// Output resolution settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
    /// Scale applied to width/height, 1..=32767 (Blender's limit).
    pub percentage: u32,
}

/// Largest `resolution_percentage` Blender accepts.
pub const MAX_RESOLUTION_PERCENTAGE: u32 = 32767;

/// One unit of render work derived from a queue message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub source_url: Url,
    pub resolution: Resolution,
    pub frames: FrameSelection,
}

impl Task {
    /// Parse a raw message body into a task with the given identifier.
    pub fn parse(id: TaskId, body: &str) -> Result<Self, TaskParseError> {
        let body: TaskBody = serde_json::from_str(body)?;
        body.into_task(id)
    }

    pub fn mode(&self) -> RenderMode {
        self.frames.mode()
    }
}

/// Errors produced while turning a message body into a [`Task`].
#[derive(Debug, Error)]
pub enum TaskParseError {
    #[error("Invalid JSON body: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Unknown task type: {0}")]
    UnknownTaskType(String),

    #[error("Invalid source URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

impl TaskParseError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field,
            reason: reason.into(),
        }
    }
}

/// Task message body as it appears on the queue.
///
/// Every field is optional at the serde level so a missing key surfaces as
/// [`TaskParseError::MissingField`] naming the key, while a mistyped value
/// is still rejected by serde.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskBody {
    pub raw_file_url: Option<String>,
    pub task_type: Option<String>,
    pub render_resolution_width: Option<u32>,
    pub render_resolution_height: Option<u32>,
    pub render_resolution_percentage: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_to_render: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_start: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_end: Option<i64>,
}

impl TaskBody {
    /// Wire value of `taskType` for single-frame renders.
    pub const TYPE_IMAGE: &'static str = "image";
    /// Wire value of `taskType` for frame-range renders.
    pub const TYPE_ANIM: &'static str = "anim";

    /// Validate the body and convert it into a [`Task`].
    pub fn into_task(self, id: TaskId) -> Result<Task, TaskParseError> {
        let raw_url = self
            .raw_file_url
            .ok_or(TaskParseError::MissingField("rawFileUrl"))?;
        let source_url = Url::parse(&raw_url).map_err(|e| TaskParseError::InvalidUrl {
            url: raw_url.clone(),
            reason: e.to_string(),
        })?;
        if !matches!(source_url.scheme(), "http" | "https") {
            return Err(TaskParseError::InvalidUrl {
                url: raw_url,
                reason: format!("unsupported scheme '{}'", source_url.scheme()),
            });
        }

        let task_type = self.task_type.ok_or(TaskParseError::MissingField("taskType"))?;

        let width = self
            .render_resolution_width
            .ok_or(TaskParseError::MissingField("renderResolutionWidth"))?;
        let height = self
            .render_resolution_height
            .ok_or(TaskParseError::MissingField("renderResolutionHeight"))?;
        let percentage = self
            .render_resolution_percentage
            .ok_or(TaskParseError::MissingField("renderResolutionPercentage"))?;

        if width == 0 {
            return Err(TaskParseError::invalid("renderResolutionWidth", "must be positive"));
        }
        if height == 0 {
            return Err(TaskParseError::invalid("renderResolutionHeight", "must be positive"));
        }
        if !(1..=MAX_RESOLUTION_PERCENTAGE).contains(&percentage) {
            return Err(TaskParseError::invalid(
                "renderResolutionPercentage",
                format!("{} is outside 1..={}", percentage, MAX_RESOLUTION_PERCENTAGE),
            ));
        }

        let frames = match task_type.as_str() {
            Self::TYPE_IMAGE => FrameSelection::Single {
                frame: self
                    .frame_to_render
                    .ok_or(TaskParseError::MissingField("frameToRender"))?,
            },
            Self::TYPE_ANIM => {
                let start = self
                    .frame_start
                    .ok_or(TaskParseError::MissingField("frameStart"))?;
                let end = self.frame_end.ok_or(TaskParseError::MissingField("frameEnd"))?;
                if start > end {
                    return Err(TaskParseError::invalid(
                        "frameEnd",
                        format!("end frame {} precedes start frame {}", end, start),
                    ));
                }
                FrameSelection::Range { start, end }
            }
            other => return Err(TaskParseError::UnknownTaskType(other.to_string())),
        };

        Ok(Task {
            id,
            source_url,
            resolution: Resolution {
                width,
                height,
                percentage,
            },
            frames,
        })
    }
}
