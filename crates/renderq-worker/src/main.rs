//! Render worker binary.

use std::sync::Arc;

use tracing::{error, info, warn};

use renderq_media::{check_blender, BlenderRenderer, HttpFetcher};
use renderq_models::Shutdown;
use renderq_queue::QueueConfig;
use renderq_worker::logging::init_tracing;
use renderq_worker::{
    listen_for_signals, PollLoop, ScratchDirs, TaskProcessor, WorkerConfig, WorkerResult,
};

#[tokio::main]
async fn main() {
    // Install rustls crypto provider (required for TLS/HTTPS); ignore if one is already set
    let _ = rustls::crypto::ring::default_provider().install_default();

    // Load environment variables
    dotenvy::dotenv().ok();

    init_tracing();

    info!("Starting renderq-worker");

    if let Err(e) = run().await {
        error!("Worker error: {}", e);
        std::process::exit(1);
    }

    info!("Worker shutdown complete");
}

async fn run() -> WorkerResult<()> {
    // Load configuration
    let config = WorkerConfig::from_env();
    config.validate()?;
    info!("Worker config: {:?}", config);

    if let Some(addr) = config.metrics_addr {
        renderq_worker::metrics::install_exporter(addr)?;
        info!("Prometheus exporter listening on {}", addr);
    }

    match check_blender(&config.render.program) {
        Ok(path) => info!("Using render engine at {}", path.display()),
        Err(e) => warn!("{}; renders will fail until it is installed", e),
    }

    let scratch = ScratchDirs::new(&config.input_dir, &config.output_dir);
    scratch.ensure().await?;

    let queue = renderq_queue::connect(QueueConfig::from_env()?).await?;

    let fetcher = Arc::new(HttpFetcher::new(config.fetch_timeout)?);
    let renderer = Arc::new(BlenderRenderer::new(
        config.render.clone(),
        config.render_runner(),
    ));
    let processor = TaskProcessor::new(fetcher, renderer, scratch);

    // Setup signal handlers
    let (shutdown, signal) = Shutdown::new();
    let listener = listen_for_signals(shutdown)?;

    let poll_loop = PollLoop::new(queue, processor, signal)
        .with_receive_wait(config.receive_wait)
        .with_idle_delay(config.idle_delay);

    let result = poll_loop.run().await;
    listener.abort();

    let stats = result?;
    info!(
        "Processed {} task(s), acknowledged {} message(s)",
        stats.processed(),
        stats.deleted
    );
    Ok(())
}
