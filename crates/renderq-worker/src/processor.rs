//! Task processing: parse, fetch, render, classify.

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use renderq_media::{AssetFetcher, RenderExit, Renderer};
use renderq_models::{ShutdownSignal, Task, TaskId, TaskOutcome, TaskReport};
use tracing::Instrument;

use crate::logging::TaskLogger;
use crate::metrics;
use crate::scratch::ScratchDirs;

/// Where a task is in its lifecycle; terminal states are [`TaskOutcome`]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStage {
    Received,
    Fetching,
    Rendering,
}

impl TaskStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStage::Received => "received",
            TaskStage::Fetching => "fetching",
            TaskStage::Rendering => "rendering",
        }
    }
}

impl fmt::Display for TaskStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Turns one message body into exactly one terminal outcome.
///
/// Nothing in here returns an error: parse, fetch and render failures are
/// all folded into the [`TaskReport`] so the caller can acknowledge the
/// message unconditionally.
pub struct TaskProcessor {
    fetcher: Arc<dyn AssetFetcher>,
    renderer: Arc<dyn Renderer>,
    scratch: ScratchDirs,
}

impl TaskProcessor {
    pub fn new(
        fetcher: Arc<dyn AssetFetcher>,
        renderer: Arc<dyn Renderer>,
        scratch: ScratchDirs,
    ) -> Self {
        Self {
            fetcher,
            renderer,
            scratch,
        }
    }

    pub fn scratch(&self) -> &ScratchDirs {
        &self.scratch
    }

    /// Process one message body.
    pub async fn process(&self, body: Option<&str>, shutdown: &ShutdownSignal) -> TaskReport {
        let task_id = TaskId::new();
        let received_at = Utc::now();
        let started = Instant::now();

        let logger = TaskLogger::new(&task_id, "render_task");
        let span = logger.create_span();

        let outcome = self
            .run_stages(&task_id, body, shutdown, &logger)
            .instrument(span.clone())
            .await;

        let elapsed = started.elapsed();
        span.in_scope(|| logger.log_outcome(&outcome));
        metrics::record_outcome(outcome.kind(), elapsed);

        TaskReport {
            task_id,
            outcome,
            received_at,
            elapsed,
        }
    }

    async fn run_stages(
        &self,
        task_id: &TaskId,
        body: Option<&str>,
        shutdown: &ShutdownSignal,
        logger: &TaskLogger,
    ) -> TaskOutcome {
        logger.log_start(TaskStage::Received.as_str());

        let Some(body) = body else {
            return TaskOutcome::MalformedTask {
                message: "message has no body".to_string(),
            };
        };

        let task = match Task::parse(task_id.clone(), body) {
            Ok(task) => task,
            Err(e) => {
                return TaskOutcome::MalformedTask {
                    message: e.to_string(),
                }
            }
        };

        if shutdown.is_requested() {
            logger.log_warning("shutdown requested before fetch");
            return TaskOutcome::Cancelled;
        }

        let input = self.scratch.input_path(task_id);
        logger.log_progress(&format!(
            "{} {} -> {}",
            TaskStage::Fetching,
            task.source_url,
            input.display()
        ));

        let fetched = tokio::select! {
            result = self.fetcher.fetch(&task.source_url, &input) => Some(result),
            _ = shutdown.cancelled() => None,
        };
        match fetched {
            None => {
                logger.log_warning("shutdown requested during fetch");
                return TaskOutcome::Cancelled;
            }
            Some(Err(e)) => {
                return TaskOutcome::FetchFailed {
                    message: e.to_string(),
                }
            }
            Some(Ok(bytes)) => logger.log_progress(&format!("fetched {} bytes", bytes)),
        }

        if shutdown.is_requested() {
            logger.log_warning("shutdown requested before render");
            return TaskOutcome::Cancelled;
        }

        self.render(&task, &input, logger, shutdown).await
    }

    async fn render(
        &self,
        task: &Task,
        input: &Path,
        logger: &TaskLogger,
        shutdown: &ShutdownSignal,
    ) -> TaskOutcome {
        let output_base = self.scratch.output_base(&task.id);
        logger.log_progress(&format!(
            "{} {} {} -> {}",
            TaskStage::Rendering,
            task.mode(),
            input.display(),
            output_base.display()
        ));

        match self
            .renderer
            .render(task, input, &output_base, shutdown)
            .await
        {
            Ok(RenderExit::Success) => TaskOutcome::Completed,
            Ok(RenderExit::Cancelled) => TaskOutcome::Cancelled,
            Ok(RenderExit::Failed { exit_code, stderr }) => {
                TaskOutcome::RenderFailed { exit_code, stderr }
            }
            Ok(RenderExit::TimedOut { after, stderr }) => TaskOutcome::RenderFailed {
                exit_code: None,
                stderr: format!("render timed out after {:?}\n{}", after, stderr),
            },
            Err(e) => TaskOutcome::RenderFailed {
                exit_code: None,
                stderr: e.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use renderq_media::{MediaError, MediaResult};
    use renderq_models::{OutcomeKind, Shutdown};
    use url::Url;

    const IMAGE_BODY: &str = r#"{
        "rawFileUrl": "https://assets.example.com/scene.blend",
        "taskType": "image",
        "renderResolutionWidth": 1920,
        "renderResolutionHeight": 1080,
        "renderResolutionPercentage": 100,
        "frameToRender": 1
    }"#;

    #[derive(Default)]
    struct FakeFetcher {
        calls: AtomicUsize,
        fail: bool,
        hang: bool,
    }

    #[async_trait]
    impl AssetFetcher for FakeFetcher {
        async fn fetch(&self, url: &Url, _dest: &Path) -> MediaResult<u64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.hang {
                std::future::pending::<()>().await;
            }
            if self.fail {
                return Err(MediaError::fetch_failed(url.as_str(), "HTTP 404", Some(404)));
            }
            Ok(42)
        }
    }

    struct FakeRenderer {
        exit: MediaResult<RenderExit>,
        seen: Mutex<Vec<(String, String)>>,
    }

    impl FakeRenderer {
        fn new(exit: MediaResult<RenderExit>) -> Self {
            Self {
                exit,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Renderer for FakeRenderer {
        async fn render(
            &self,
            _task: &Task,
            input: &Path,
            output_base: &Path,
            _shutdown: &ShutdownSignal,
        ) -> MediaResult<RenderExit> {
            self.seen.lock().unwrap().push((
                input.display().to_string(),
                output_base.display().to_string(),
            ));
            match &self.exit {
                Ok(exit) => Ok(exit.clone()),
                Err(_) => Err(MediaError::InvalidCommand("engine missing".to_string())),
            }
        }
    }

    fn processor(fetcher: Arc<FakeFetcher>, renderer: Arc<FakeRenderer>) -> TaskProcessor {
        TaskProcessor::new(fetcher, renderer, ScratchDirs::new("in", "out"))
    }

    #[tokio::test]
    async fn test_completed() {
        let renderer = Arc::new(FakeRenderer::new(Ok(RenderExit::Success)));
        let p = processor(Arc::new(FakeFetcher::default()), renderer.clone());
        let (_shutdown, signal) = Shutdown::new();

        let report = p.process(Some(IMAGE_BODY), &signal).await;

        assert_eq!(report.outcome, TaskOutcome::Completed);
        let seen = renderer.seen.lock().unwrap();
        assert_eq!(seen[0].0, format!("in/{}.blend", report.task_id));
        assert_eq!(seen[0].1, format!("out/{}_output", report.task_id));
    }

    #[tokio::test]
    async fn test_malformed_bodies() {
        let fetcher = Arc::new(FakeFetcher::default());
        let p = processor(
            fetcher.clone(),
            Arc::new(FakeRenderer::new(Ok(RenderExit::Success))),
        );
        let (_shutdown, signal) = Shutdown::new();

        for body in [None, Some("not json"), Some(r#"{"taskType":"video"}"#)] {
            let report = p.process(body, &signal).await;
            assert_eq!(report.kind(), OutcomeKind::MalformedTask);
        }
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_fetch_failure_skips_render() {
        let renderer = Arc::new(FakeRenderer::new(Ok(RenderExit::Success)));
        let fetcher = Arc::new(FakeFetcher {
            fail: true,
            ..FakeFetcher::default()
        });
        let p = processor(fetcher, renderer.clone());
        let (_shutdown, signal) = Shutdown::new();

        let report = p.process(Some(IMAGE_BODY), &signal).await;

        assert_eq!(report.kind(), OutcomeKind::FetchFailed);
        assert!(renderer.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_render_failure_keeps_stderr() {
        let renderer = Arc::new(FakeRenderer::new(Ok(RenderExit::Failed {
            exit_code: Some(1),
            stderr: "Error: Cannot read file".to_string(),
        })));
        let p = processor(Arc::new(FakeFetcher::default()), renderer);
        let (_shutdown, signal) = Shutdown::new();

        let report = p.process(Some(IMAGE_BODY), &signal).await;

        assert_eq!(
            report.outcome,
            TaskOutcome::RenderFailed {
                exit_code: Some(1),
                stderr: "Error: Cannot read file".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_timeout_and_launch_error_are_render_failures() {
        let (_shutdown, signal) = Shutdown::new();

        let timed_out = processor(
            Arc::new(FakeFetcher::default()),
            Arc::new(FakeRenderer::new(Ok(RenderExit::TimedOut {
                after: Duration::from_secs(5),
                stderr: String::new(),
            }))),
        );
        let report = timed_out.process(Some(IMAGE_BODY), &signal).await;
        match report.outcome {
            TaskOutcome::RenderFailed { exit_code, stderr } => {
                assert_eq!(exit_code, None);
                assert!(stderr.contains("timed out"));
            }
            other => panic!("unexpected outcome {:?}", other),
        }

        let launch_error = processor(
            Arc::new(FakeFetcher::default()),
            Arc::new(FakeRenderer::new(Err(MediaError::InvalidCommand(
                String::new(),
            )))),
        );
        let report = launch_error.process(Some(IMAGE_BODY), &signal).await;
        assert_eq!(report.kind(), OutcomeKind::RenderFailed);
    }

    #[tokio::test]
    async fn test_shutdown_before_fetch_cancels() {
        let fetcher = Arc::new(FakeFetcher::default());
        let p = processor(
            fetcher.clone(),
            Arc::new(FakeRenderer::new(Ok(RenderExit::Success))),
        );
        let (shutdown, signal) = Shutdown::new();
        shutdown.trigger();

        let report = p.process(Some(IMAGE_BODY), &signal).await;

        assert_eq!(report.outcome, TaskOutcome::Cancelled);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_shutdown_during_fetch_cancels() {
        let fetcher = Arc::new(FakeFetcher {
            hang: true,
            ..FakeFetcher::default()
        });
        let p = processor(fetcher, Arc::new(FakeRenderer::new(Ok(RenderExit::Success))));
        let (shutdown, signal) = Shutdown::new();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            shutdown.trigger();
        });

        let report = tokio::time::timeout(Duration::from_secs(5), p.process(Some(IMAGE_BODY), &signal))
            .await
            .expect("processor did not observe shutdown");
        assert_eq!(report.outcome, TaskOutcome::Cancelled);
    }

    #[tokio::test]
    async fn test_identical_bodies_get_distinct_ids() {
        let renderer = Arc::new(FakeRenderer::new(Ok(RenderExit::Success)));
        let p = processor(Arc::new(FakeFetcher::default()), renderer.clone());
        let (_shutdown, signal) = Shutdown::new();

        let a = p.process(Some(IMAGE_BODY), &signal).await;
        let b = p.process(Some(IMAGE_BODY), &signal).await;

        assert_ne!(a.task_id, b.task_id);
        let seen = renderer.seen.lock().unwrap();
        assert_ne!(seen[0], seen[1]);
    }
}
