//! Blender command builder.

use std::path::{Path, PathBuf};

use renderq_models::{FrameSelection, Resolution, Task};

use crate::error::{MediaError, MediaResult};

/// Default render engine.
pub const DEFAULT_ENGINE: &str = "CYCLES";
/// Default Cycles compute device type.
pub const DEFAULT_DEVICE: &str = "CUDA";
/// Default output image format.
pub const DEFAULT_OUTPUT_FORMAT: &str = "PNG";

/// Builder for background Blender render commands.
#[derive(Debug, Clone)]
pub struct BlenderCommand {
    /// Blender executable
    program: PathBuf,
    /// Input .blend file
    input: PathBuf,
    /// Output path template (Blender appends frame numbers)
    output: PathBuf,
    /// Render engine identifier, e.g. CYCLES
    engine: String,
    /// Cycles compute device type, e.g. CUDA, OPTIX, NONE
    device_type: String,
    /// Resolution overrides
    resolution: Option<Resolution>,
    /// Output image format, e.g. PNG
    output_format: String,
    /// Whether Blender adds the file extension
    use_extension: bool,
    /// Frames to render
    frames: Option<FrameSelection>,
}

impl BlenderCommand {
    /// Create a new Blender command.
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self {
            program: PathBuf::from("blender"),
            input: input.as_ref().to_path_buf(),
            output: output.as_ref().to_path_buf(),
            engine: DEFAULT_ENGINE.to_string(),
            device_type: DEFAULT_DEVICE.to_string(),
            resolution: None,
            output_format: DEFAULT_OUTPUT_FORMAT.to_string(),
            use_extension: true,
            frames: None,
        }
    }

    /// Create a command rendering `task` from `input` into `output`.
    pub fn for_task(task: &Task, input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self::new(input, output)
            .resolution(task.resolution)
            .frames(task.frames)
    }

    /// Set the Blender executable.
    pub fn program(mut self, program: impl AsRef<Path>) -> Self {
        self.program = program.as_ref().to_path_buf();
        self
    }

    /// Set the render engine.
    pub fn engine(mut self, engine: impl Into<String>) -> Self {
        self.engine = engine.into();
        self
    }

    /// Set the Cycles compute device type.
    pub fn compute_device(mut self, device_type: impl Into<String>) -> Self {
        self.device_type = device_type.into();
        self
    }

    /// Set resolution overrides.
    pub fn resolution(mut self, resolution: Resolution) -> Self {
        self.resolution = Some(resolution);
        self
    }

    /// Set output image format.
    pub fn output_format(mut self, format: impl Into<String>) -> Self {
        self.output_format = format.into();
        self
    }

    /// Set whether Blender appends a file extension to outputs.
    pub fn use_extension(mut self, enabled: bool) -> Self {
        self.use_extension = enabled;
        self
    }

    /// Set frames to render.
    pub fn frames(mut self, frames: FrameSelection) -> Self {
        self.frames = Some(frames);
        self
    }

    pub fn program_path(&self) -> &Path {
        &self.program
    }

    /// Validate identifiers that are interpolated into the Python expression.
    pub fn validate(&self) -> MediaResult<()> {
        for (name, value) in [
            ("engine", &self.engine),
            ("device type", &self.device_type),
            ("output format", &self.output_format),
        ] {
            if !is_blender_identifier(value) {
                return Err(MediaError::InvalidCommand(format!(
                    "invalid {}: '{}'",
                    name, value
                )));
            }
        }
        Ok(())
    }

    /// Python run inside Blender before rendering: engine, devices and resolution.
    pub fn python_expr(&self) -> String {
        let mut lines = vec![
            "import bpy".to_string(),
            "scene = bpy.context.scene".to_string(),
            format!("scene.render.engine = '{}'", self.engine),
        ];

        if self.engine == "CYCLES" {
            lines.push("prefs = bpy.context.preferences.addons['cycles'].preferences".to_string());
            lines.push(format!("prefs.compute_device_type = '{}'", self.device_type));
            lines.push("prefs.get_devices()".to_string());
            lines.push("for device in prefs.devices:".to_string());
            lines.push("    device.use = True".to_string());
            if self.device_type != "NONE" {
                lines.push("scene.cycles.device = 'GPU'".to_string());
            }
        }

        if let Some(res) = self.resolution {
            lines.push(format!("scene.render.resolution_x = {}", res.width));
            lines.push(format!("scene.render.resolution_y = {}", res.height));
            lines.push(format!("scene.render.resolution_percentage = {}", res.percentage));
        }

        lines.join("\n")
    }

    /// Build the command arguments.
    ///
    /// Frame arguments come last: Blender evaluates arguments in order and
    /// starts rendering when it reaches them.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = vec![
            "-b".to_string(),
            self.input.to_string_lossy().to_string(),
            "--python-expr".to_string(),
            self.python_expr(),
            "-o".to_string(),
            self.output.to_string_lossy().to_string(),
            "-F".to_string(),
            self.output_format.clone(),
            "-x".to_string(),
            if self.use_extension { "1" } else { "0" }.to_string(),
        ];

        if let Some(frames) = &self.frames {
            args.extend(frame_args(frames));
        }

        args
    }
}

/// Frame-selection arguments for a render.
pub fn frame_args(frames: &FrameSelection) -> Vec<String> {
    match *frames {
        FrameSelection::Single { frame } => vec!["-f".to_string(), frame.to_string()],
        FrameSelection::Range { start, end } => vec![
            "-s".to_string(),
            start.to_string(),
            "-e".to_string(),
            end.to_string(),
            "-a".to_string(),
        ],
    }
}

/// True for non-empty `[A-Za-z0-9_]` strings.
pub fn is_blender_identifier(value: &str) -> bool {
    !value.is_empty() && value.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Check that the Blender executable resolves.
pub fn check_blender(program: impl AsRef<Path>) -> MediaResult<PathBuf> {
    let program = program.as_ref();
    which::which(program).map_err(|_| MediaError::EngineNotFound(program.display().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use renderq_models::TaskId;

    fn task(frames: FrameSelection) -> Task {
        Task {
            id: TaskId::from_string("t"),
            source_url: url::Url::parse("http://x/a.blend").unwrap(),
            resolution: Resolution {
                width: 1920,
                height: 1080,
                percentage: 100,
            },
            frames,
        }
    }

    #[test]
    fn test_image_frame_args() {
        let args = frame_args(&FrameSelection::Single { frame: 5 });
        assert_eq!(args, vec!["-f", "5"]);
    }

    #[test]
    fn test_anim_frame_args() {
        let args = frame_args(&FrameSelection::Range { start: 10, end: 20 });
        assert_eq!(args, vec!["-s", "10", "-e", "20", "-a"]);
    }

    #[test]
    fn test_image_command_has_only_single_frame_flag() {
        let cmd = BlenderCommand::for_task(
            &task(FrameSelection::Single { frame: 5 }),
            "uploads/t.blend",
            "outputs/t_output",
        );
        let args = cmd.build_args();

        assert_eq!(&args[..2], ["-b", "uploads/t.blend"]);
        assert_eq!(&args[args.len() - 2..], ["-f", "5"]);
        assert!(!args.contains(&"-a".to_string()));
        assert!(!args.contains(&"-s".to_string()));

        let o = args.iter().position(|a| a == "-o").unwrap();
        assert_eq!(args[o + 1], "outputs/t_output");
        let f = args.iter().position(|a| a == "-F").unwrap();
        assert_eq!(args[f + 1], "PNG");
    }

    #[test]
    fn test_anim_command_ends_with_range() {
        let cmd = BlenderCommand::for_task(
            &task(FrameSelection::Range { start: 1, end: 250 }),
            "in.blend",
            "out",
        );
        let args = cmd.build_args();
        assert_eq!(&args[args.len() - 5..], ["-s", "1", "-e", "250", "-a"]);
        assert!(!args.contains(&"-f".to_string()));
    }

    #[test]
    fn test_python_expr_sets_engine_devices_and_resolution() {
        let expr = BlenderCommand::for_task(
            &task(FrameSelection::Single { frame: 1 }),
            "in.blend",
            "out",
        )
        .python_expr();

        assert!(expr.contains("scene.render.engine = 'CYCLES'"));
        assert!(expr.contains("prefs.compute_device_type = 'CUDA'"));
        assert!(expr.contains("for device in prefs.devices:\n    device.use = True"));
        assert!(expr.contains("scene.render.resolution_x = 1920"));
        assert!(expr.contains("scene.render.resolution_y = 1080"));
        assert!(expr.contains("scene.render.resolution_percentage = 100"));
    }

    #[test]
    fn test_non_cycles_engine_skips_device_setup() {
        let expr = BlenderCommand::new("in.blend", "out")
            .engine("BLENDER_EEVEE_NEXT")
            .python_expr();
        assert!(!expr.contains("compute_device_type"));
        assert!(!expr.contains("resolution_x"));
    }

    #[test]
    fn test_validate_rejects_injection() {
        assert!(BlenderCommand::new("a", "b").validate().is_ok());
        assert!(BlenderCommand::new("a", "b")
            .engine("CYCLES'; import os; '")
            .validate()
            .is_err());
        assert!(!is_blender_identifier(""));
        assert!(is_blender_identifier("OPTIX"));
    }
}
