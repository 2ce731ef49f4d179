//! Handle to one running render engine process.
//!
//! Lifecycle: `Launched → Running → {Exited | Terminated}`. Status checks are
//! non-blocking; termination is a separate, explicit request.

use std::ffi::OsStr;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};

/// Bytes of stdout/stderr kept per stream.
pub const OUTPUT_TAIL_BYTES: usize = 64 * 1024;

/// How long to wait for the pipe readers after the process is gone.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Observable state of a render process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    /// Spawned, not yet polled.
    Launched,
    /// Polled at least once and still alive.
    Running,
    /// Exited on its own. `code` is `None` when killed by a signal.
    Exited { code: Option<i32> },
    /// Stopped by [`RenderProcess::terminate`].
    Terminated,
}

impl ProcessState {
    pub fn is_finished(&self) -> bool {
        matches!(self, ProcessState::Exited { .. } | ProcessState::Terminated)
    }
}

/// Captured diagnostic output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedOutput {
    pub stdout: String,
    pub stderr: String,
}

/// A running render engine invocation.
pub struct RenderProcess {
    child: Child,
    pid: Option<u32>,
    program: String,
    state: ProcessState,
    stdout: OutputTail,
    stderr: OutputTail,
}

impl RenderProcess {
    /// Launch `program` with `args`.
    ///
    /// Returns as soon as the process is spawned. Both output streams are
    /// piped and drained in the background so the child never blocks on a
    /// full pipe.
    pub fn spawn<S: AsRef<OsStr>>(program: impl AsRef<OsStr>, args: &[S]) -> MediaResult<Self> {
        let program_name = program.as_ref().to_string_lossy().to_string();

        let mut child = Command::new(program.as_ref())
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| MediaError::SpawnFailed {
                program: program_name.clone(),
                source,
            })?;

        let stdout = OutputTail::drain(child.stdout.take());
        let stderr = OutputTail::drain(child.stderr.take());
        let pid = child.id();

        debug!(pid = ?pid, program = %program_name, "Launched render process");

        Ok(Self {
            child,
            pid,
            program: program_name,
            state: ProcessState::Launched,
            stdout,
            stderr,
        })
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Last observed state, without polling.
    pub fn state(&self) -> ProcessState {
        self.state
    }

    /// Poll the process without blocking.
    pub fn try_status(&mut self) -> MediaResult<ProcessState> {
        if self.state.is_finished() {
            return Ok(self.state);
        }

        self.state = match self.child.try_wait()? {
            Some(status) => ProcessState::Exited {
                code: status.code(),
            },
            None => ProcessState::Running,
        };

        Ok(self.state)
    }

    /// Ask the process to stop.
    ///
    /// Sends SIGTERM and waits up to `grace` for it to exit, then falls back
    /// to SIGKILL. A process that had already exited keeps its `Exited` state.
    pub async fn terminate(&mut self, grace: Duration) -> MediaResult<ProcessState> {
        if self.try_status()?.is_finished() {
            return Ok(self.state);
        }

        if let Some(pid) = self.pid {
            match kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                Ok(()) | Err(Errno::ESRCH) => {}
                Err(e) => {
                    return Err(MediaError::SignalFailed {
                        pid,
                        message: e.to_string(),
                    })
                }
            }
        }

        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(status) => {
                let status = status?;
                debug!(pid = ?self.pid, ?status, "Render process stopped after SIGTERM");
            }
            Err(_) => {
                warn!(
                    pid = ?self.pid,
                    "Render process ignored SIGTERM for {:?}, killing",
                    grace
                );
                self.child.kill().await?;
            }
        }

        self.state = ProcessState::Terminated;
        Ok(self.state)
    }

    /// Output captured so far, without waiting for the readers.
    pub fn output_snapshot(&self) -> CapturedOutput {
        CapturedOutput {
            stdout: self.stdout.snapshot(),
            stderr: self.stderr.snapshot(),
        }
    }

    /// Wait briefly for the pipe readers to hit EOF and return the output tails.
    pub async fn collect_output(&mut self) -> CapturedOutput {
        self.stdout.finish(DRAIN_TIMEOUT).await;
        self.stderr.finish(DRAIN_TIMEOUT).await;
        self.output_snapshot()
    }
}

impl std::fmt::Debug for RenderProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderProcess")
            .field("pid", &self.pid)
            .field("program", &self.program)
            .field("state", &self.state)
            .finish()
    }
}

/// Bounded tail of one output stream, filled by a background reader.
struct OutputTail {
    buffer: Arc<Mutex<TailBuffer>>,
    reader: Option<JoinHandle<()>>,
}

impl OutputTail {
    fn drain<R>(stream: Option<R>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buffer = Arc::new(Mutex::new(TailBuffer::new(OUTPUT_TAIL_BYTES)));
        let reader = stream.map(|mut stream| {
            let buffer = Arc::clone(&buffer);
            tokio::spawn(async move {
                let mut chunk = [0u8; 8192];
                loop {
                    match stream.read(&mut chunk).await {
                        Ok(0) => break,
                        Ok(n) => {
                            if let Ok(mut buf) = buffer.lock() {
                                buf.push(&chunk[..n]);
                            }
                        }
                        Err(e) => {
                            debug!("Output reader stopped: {}", e);
                            break;
                        }
                    }
                }
            })
        });

        Self { buffer, reader }
    }

    async fn finish(&mut self, timeout: Duration) {
        if let Some(mut reader) = self.reader.take() {
            if tokio::time::timeout(timeout, &mut reader).await.is_err() {
                // Pipe held open by a grandchild; keep what we have.
                reader.abort();
            }
        }
    }

    fn snapshot(&self) -> String {
        self.buffer
            .lock()
            .map(|buf| buf.to_string_lossy())
            .unwrap_or_default()
    }
}

#[derive(Debug)]
struct TailBuffer {
    data: Vec<u8>,
    cap: usize,
    truncated: bool,
}

impl TailBuffer {
    fn new(cap: usize) -> Self {
        Self {
            data: Vec::new(),
            cap,
            truncated: false,
        }
    }

    fn push(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
        if self.data.len() > self.cap {
            let excess = self.data.len() - self.cap;
            self.data.drain(..excess);
            self.truncated = true;
        }
    }

    fn to_string_lossy(&self) -> String {
        let text = String::from_utf8_lossy(&self.data);
        if self.truncated {
            format!("[truncated]\n{}", text)
        } else {
            text.into_owned()
        }
    }
}
