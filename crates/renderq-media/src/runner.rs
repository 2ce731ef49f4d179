//! Supervision loop for render processes.

use std::ffi::OsStr;
use std::time::Duration;

use renderq_models::ShutdownSignal;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::error::MediaResult;
use crate::process::{ProcessState, RenderProcess};

/// Default status poll interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
/// Default wait between SIGTERM and SIGKILL.
pub const DEFAULT_TERMINATE_GRACE: Duration = Duration::from_secs(10);

/// How a supervised render ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderExit {
    /// Exit status zero.
    Success,
    /// Non-zero exit, or killed by a signal we did not send.
    Failed {
        exit_code: Option<i32>,
        stderr: String,
    },
    /// Shutdown requested; the process was terminated.
    Cancelled,
    /// The render ran past the configured limit and was terminated.
    TimedOut { after: Duration, stderr: String },
}

/// Runs and supervises render processes with cancellation and an optional timeout.
#[derive(Debug, Clone)]
pub struct RenderRunner {
    poll_interval: Duration,
    terminate_grace: Duration,
    timeout: Option<Duration>,
}

impl Default for RenderRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderRunner {
    /// Create a new runner.
    pub fn new() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            terminate_grace: DEFAULT_TERMINATE_GRACE,
            timeout: None,
        }
    }

    /// Set the status poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set how long a terminated process gets before SIGKILL.
    pub fn with_terminate_grace(mut self, grace: Duration) -> Self {
        self.terminate_grace = grace;
        self
    }

    /// Set a wall-clock limit for a single render.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Launch `program` and supervise it to completion.
    ///
    /// Does not launch anything if shutdown is already requested.
    pub async fn run<S: AsRef<OsStr>>(
        &self,
        program: impl AsRef<OsStr>,
        args: &[S],
        shutdown: &ShutdownSignal,
    ) -> MediaResult<RenderExit> {
        if shutdown.is_requested() {
            return Ok(RenderExit::Cancelled);
        }

        let process = RenderProcess::spawn(program, args)?;
        self.supervise(process, shutdown).await
    }

    /// Poll `process` every tick until it exits, shutdown fires, or the timeout elapses.
    pub async fn supervise(
        &self,
        mut process: RenderProcess,
        shutdown: &ShutdownSignal,
    ) -> MediaResult<RenderExit> {
        let started = Instant::now();
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            match process.try_status()? {
                ProcessState::Exited { code } => {
                    let output = process.collect_output().await;
                    debug!(pid = ?process.pid(), ?code, "Render process exited");
                    if code == Some(0) {
                        return Ok(RenderExit::Success);
                    }
                    return Ok(RenderExit::Failed {
                        exit_code: code,
                        stderr: output.stderr,
                    });
                }
                ProcessState::Terminated => return Ok(RenderExit::Cancelled),
                ProcessState::Launched | ProcessState::Running => {}
            }

            if shutdown.is_requested() {
                info!(pid = ?process.pid(), "Shutdown requested, terminating render process");
                self.stop(&mut process).await;
                return Ok(RenderExit::Cancelled);
            }

            if let Some(limit) = self.timeout {
                if started.elapsed() >= limit {
                    warn!(pid = ?process.pid(), "Render exceeded {:?}, terminating", limit);
                    self.stop(&mut process).await;
                    let output = process.collect_output().await;
                    return Ok(RenderExit::TimedOut {
                        after: limit,
                        stderr: output.stderr,
                    });
                }
            }

            tokio::select! {
                _ = shutdown.cancelled() => {}
                _ = ticker.tick() => {}
            }
        }
    }

    async fn stop(&self, process: &mut RenderProcess) {
        if let Err(e) = process.terminate(self.terminate_grace).await {
            warn!(pid = ?process.pid(), "Failed to terminate render process: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;
    use renderq_models::Shutdown;

    fn runner() -> RenderRunner {
        RenderRunner::new()
            .with_poll_interval(Duration::from_millis(20))
            .with_terminate_grace(Duration::from_secs(2))
    }

    #[tokio::test]
    async fn test_success() {
        let (_shutdown, signal) = Shutdown::new();
        let exit = runner().run("true", &[] as &[&str], &signal).await.unwrap();
        assert_eq!(exit, RenderExit::Success);
    }

    #[tokio::test]
    async fn test_failure_carries_stderr() {
        let (_shutdown, signal) = Shutdown::new();
        let exit = runner()
            .run("sh", &["-c", "echo 'Blender quit: out of memory' >&2; exit 1"], &signal)
            .await
            .unwrap();

        match exit {
            RenderExit::Failed { exit_code, stderr } => {
                assert_eq!(exit_code, Some(1));
                assert!(stderr.contains("out of memory"));
            }
            other => panic!("unexpected exit: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_cancel_within_one_tick() {
        let (shutdown, signal) = Shutdown::new();
        // A long tick shows cancellation does not wait for the next poll.
        let runner = runner().with_poll_interval(Duration::from_secs(1));

        let process = RenderProcess::spawn("sleep", &["30"]).unwrap();
        let pid = process.pid().expect("child has a pid");
        let handle = tokio::spawn(async move { runner.supervise(process, &signal).await });

        tokio::time::sleep(Duration::from_millis(150)).await;
        let fired_at = Instant::now();
        shutdown.trigger();

        let exit = tokio::time::timeout(Duration::from_secs(3), handle)
            .await
            .expect("runner did not stop")
            .unwrap()
            .unwrap();

        assert_eq!(exit, RenderExit::Cancelled);
        assert!(fired_at.elapsed() <= Duration::from_secs(1));
        // Terminated and reaped: the pid no longer exists.
        assert!(kill(Pid::from_raw(pid as i32), None).is_err());
    }

    #[tokio::test]
    async fn test_no_launch_after_shutdown() {
        let (shutdown, signal) = Shutdown::new();
        shutdown.trigger();
        // Would fail to spawn if it were attempted.
        let exit = runner()
            .run("definitely-not-blender-xyz", &[] as &[&str], &signal)
            .await
            .unwrap();
        assert_eq!(exit, RenderExit::Cancelled);
    }

    #[tokio::test]
    async fn test_timeout_terminates() {
        let (_shutdown, signal) = Shutdown::new();
        let exit = runner()
            .with_timeout(Duration::from_millis(100))
            .run("sleep", &["30"], &signal)
            .await
            .unwrap();
        assert!(matches!(exit, RenderExit::TimedOut { after, .. } if after == Duration::from_millis(100)));
    }
}
