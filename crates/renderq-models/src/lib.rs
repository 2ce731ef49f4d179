//! Shared data models for the renderq worker.
//!
//! This crate provides:
//! - Render tasks and their queue wire body
//! - Terminal task outcomes and reports
//! - The cooperative shutdown token

pub mod outcome;
pub mod shutdown;
pub mod task;

// Re-export common types
pub use outcome::{OutcomeKind, TaskOutcome, TaskReport};
pub use shutdown::{Shutdown, ShutdownSignal};
pub use task::{FrameSelection, RenderMode, Resolution, Task, TaskBody, TaskId, TaskParseError};
