//! Local scratch layout for task inputs and outputs.

use std::path::{Path, PathBuf};

use renderq_models::TaskId;
use tokio::fs;
use tracing::debug;

use crate::error::WorkerResult;

/// Input and output directories. Paths are keyed by task ID, so tasks
/// with identical bodies never share files.
#[derive(Debug, Clone)]
pub struct ScratchDirs {
    input_dir: PathBuf,
    output_dir: PathBuf,
}

impl ScratchDirs {
    pub fn new(input_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            input_dir: input_dir.into(),
            output_dir: output_dir.into(),
        }
    }

    /// Create both directories if missing.
    pub async fn ensure(&self) -> WorkerResult<()> {
        fs::create_dir_all(&self.input_dir).await?;
        fs::create_dir_all(&self.output_dir).await?;
        debug!(
            "Scratch dirs ready: input={} output={}",
            self.input_dir.display(),
            self.output_dir.display()
        );
        Ok(())
    }

    pub fn input_dir(&self) -> &Path {
        &self.input_dir
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// `<input_dir>/<task_id>.blend`
    pub fn input_path(&self, task_id: &TaskId) -> PathBuf {
        self.input_dir.join(format!("{}.blend", task_id))
    }

    /// `<output_dir>/<task_id>_output`; the engine appends frame numbers and extension.
    pub fn output_base(&self, task_id: &TaskId) -> PathBuf {
        self.output_dir.join(format!("{}_output", task_id))
    }
}
