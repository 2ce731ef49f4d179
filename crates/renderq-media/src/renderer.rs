//! Render engine seam used by the task processor.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use renderq_models::{ShutdownSignal, Task};
use tracing::debug;

use crate::command::{BlenderCommand, DEFAULT_DEVICE, DEFAULT_ENGINE, DEFAULT_OUTPUT_FORMAT};
use crate::error::MediaResult;
use crate::runner::{RenderExit, RenderRunner};

/// Renders one task from a local input file.
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(
        &self,
        task: &Task,
        input: &Path,
        output_base: &Path,
        shutdown: &ShutdownSignal,
    ) -> MediaResult<RenderExit>;
}

/// Engine settings shared by every task.
#[derive(Debug, Clone)]
pub struct RenderSettings {
    pub program: PathBuf,
    pub engine: String,
    pub device_type: String,
    pub output_format: String,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            program: PathBuf::from("blender"),
            engine: DEFAULT_ENGINE.to_string(),
            device_type: DEFAULT_DEVICE.to_string(),
            output_format: DEFAULT_OUTPUT_FORMAT.to_string(),
        }
    }
}

/// [`Renderer`] that runs Blender in background mode.
#[derive(Debug, Clone)]
pub struct BlenderRenderer {
    settings: RenderSettings,
    runner: RenderRunner,
}

impl BlenderRenderer {
    pub fn new(settings: RenderSettings, runner: RenderRunner) -> Self {
        Self { settings, runner }
    }

    /// Build the Blender invocation for `task`.
    pub fn command_for(&self, task: &Task, input: &Path, output_base: &Path) -> BlenderCommand {
        BlenderCommand::for_task(task, input, output_base)
            .program(&self.settings.program)
            .engine(self.settings.engine.clone())
            .compute_device(self.settings.device_type.clone())
            .output_format(self.settings.output_format.clone())
    }
}

#[async_trait]
impl Renderer for BlenderRenderer {
    async fn render(
        &self,
        task: &Task,
        input: &Path,
        output_base: &Path,
        shutdown: &ShutdownSignal,
    ) -> MediaResult<RenderExit> {
        let cmd = self.command_for(task, input, output_base);
        cmd.validate()?;

        let args = cmd.build_args();
        debug!(
            task_id = %task.id,
            "Running {} {}",
            cmd.program_path().display(),
            args.join(" ")
        );

        self.runner.run(cmd.program_path(), &args, shutdown).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use renderq_models::{FrameSelection, Resolution, Shutdown, TaskId};
    use std::time::Duration;

    fn task() -> Task {
        Task {
            id: TaskId::from_string("t"),
            source_url: url::Url::parse("http://x/a.blend").unwrap(),
            resolution: Resolution {
                width: 640,
                height: 480,
                percentage: 50,
            },
            frames: FrameSelection::Range { start: 1, end: 3 },
        }
    }

    #[test]
    fn test_command_uses_settings() {
        let renderer = BlenderRenderer::new(
            RenderSettings {
                program: PathBuf::from("/opt/blender/blender"),
                engine: "CYCLES".to_string(),
                device_type: "OPTIX".to_string(),
                output_format: "OPEN_EXR".to_string(),
            },
            RenderRunner::new(),
        );

        let cmd = renderer.command_for(&task(), Path::new("in.blend"), Path::new("out"));
        assert_eq!(cmd.program_path(), Path::new("/opt/blender/blender"));

        let args = cmd.build_args();
        assert!(args.contains(&"OPEN_EXR".to_string()));
        assert!(cmd.python_expr().contains("'OPTIX'"));
        assert_eq!(&args[args.len() - 5..], ["-s", "1", "-e", "3", "-a"]);
    }

    #[tokio::test]
    async fn test_invalid_settings_rejected_before_launch() {
        let renderer = BlenderRenderer::new(
            RenderSettings {
                engine: "CYCLES; rm".to_string(),
                ..RenderSettings::default()
            },
            RenderRunner::new().with_poll_interval(Duration::from_millis(10)),
        );
        let (_shutdown, signal) = Shutdown::new();
        let result = renderer
            .render(&task(), Path::new("in.blend"), Path::new("out"), &signal)
            .await;
        assert!(result.is_err());
    }
}
