//! Worker configuration.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use renderq_media::command::is_blender_identifier;
use renderq_media::{RenderRunner, RenderSettings};

use crate::error::{WorkerError, WorkerResult};

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Directory for downloaded .blend inputs
    pub input_dir: PathBuf,
    /// Directory for render outputs
    pub output_dir: PathBuf,
    /// Long-poll wait per receive call
    pub receive_wait: Duration,
    /// Pause between poll iterations
    pub idle_delay: Duration,
    /// Render process status poll interval
    pub poll_interval: Duration,
    /// Time between SIGTERM and SIGKILL when stopping a render
    pub terminate_grace: Duration,
    /// Optional wall-clock limit per render
    pub render_timeout: Option<Duration>,
    /// HTTP timeout for asset downloads
    pub fetch_timeout: Duration,
    /// Prometheus listener address; no exporter when unset
    pub metrics_addr: Option<SocketAddr>,
    /// Render engine settings
    pub render: RenderSettings,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("uploads"),
            output_dir: PathBuf::from("outputs"),
            receive_wait: Duration::from_secs(10),
            idle_delay: Duration::from_secs(1),
            poll_interval: Duration::from_secs(1),
            terminate_grace: Duration::from_secs(10),
            render_timeout: None,
            fetch_timeout: Duration::from_secs(300),
            metrics_addr: None,
            render: RenderSettings::default(),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let render_defaults = RenderSettings::default();

        Self {
            input_dir: std::env::var("WORKER_INPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.input_dir),
            output_dir: std::env::var("WORKER_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_dir),
            receive_wait: Duration::from_secs(env_parse("WORKER_RECEIVE_WAIT_SECS").unwrap_or(10)),
            idle_delay: Duration::from_millis(env_parse("WORKER_IDLE_DELAY_MS").unwrap_or(1000)),
            poll_interval: Duration::from_millis(
                env_parse("WORKER_POLL_INTERVAL_MS").unwrap_or(1000),
            ),
            terminate_grace: Duration::from_secs(
                env_parse("WORKER_TERMINATE_GRACE_SECS").unwrap_or(10),
            ),
            render_timeout: env_parse("WORKER_RENDER_TIMEOUT_SECS").map(Duration::from_secs),
            fetch_timeout: Duration::from_secs(env_parse("WORKER_FETCH_TIMEOUT_SECS").unwrap_or(300)),
            metrics_addr: env_parse("WORKER_METRICS_ADDR"),
            render: RenderSettings {
                program: std::env::var("BLENDER_PATH")
                    .map(PathBuf::from)
                    .unwrap_or(render_defaults.program),
                engine: std::env::var("RENDER_ENGINE").unwrap_or(render_defaults.engine),
                device_type: std::env::var("RENDER_DEVICE").unwrap_or(render_defaults.device_type),
                output_format: std::env::var("RENDER_OUTPUT_FORMAT")
                    .unwrap_or(render_defaults.output_format),
            },
        }
    }

    /// Reject values the worker cannot run with.
    pub fn validate(&self) -> WorkerResult<()> {
        if self.poll_interval.is_zero() {
            return Err(WorkerError::config_error("WORKER_POLL_INTERVAL_MS must be positive"));
        }
        if self.render_timeout.is_some_and(|t| t.is_zero()) {
            return Err(WorkerError::config_error("WORKER_RENDER_TIMEOUT_SECS must be positive"));
        }
        if self.fetch_timeout.is_zero() {
            return Err(WorkerError::config_error("WORKER_FETCH_TIMEOUT_SECS must be positive"));
        }
        for (key, value) in [
            ("RENDER_ENGINE", &self.render.engine),
            ("RENDER_DEVICE", &self.render.device_type),
            ("RENDER_OUTPUT_FORMAT", &self.render.output_format),
        ] {
            if !is_blender_identifier(value) {
                return Err(WorkerError::config_error(format!(
                    "{} must match [A-Za-z0-9_]+, got '{}'",
                    key, value
                )));
            }
        }
        Ok(())
    }

    /// Supervision settings for render processes.
    pub fn render_runner(&self) -> RenderRunner {
        let runner = RenderRunner::new()
            .with_poll_interval(self.poll_interval)
            .with_terminate_grace(self.terminate_grace);
        match self.render_timeout {
            Some(timeout) => runner.with_timeout(timeout),
            None => runner,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}
