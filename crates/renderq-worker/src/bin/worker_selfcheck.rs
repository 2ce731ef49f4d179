use std::path::Path;

use renderq_media::check_blender;
use renderq_queue::QueueBackend;
use renderq_worker::WorkerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = WorkerConfig::from_env();
    config.validate()?;

    println!(
        "worker-selfcheck: starting with input_dir={} output_dir={}",
        config.input_dir.display(),
        config.output_dir.display()
    );
    ensure_writable_dir(&config.input_dir).await?;
    ensure_writable_dir(&config.output_dir).await?;
    ensure_blender(&config.render.program)?;
    ensure_queue_env()?;

    println!("worker-selfcheck: ok");
    Ok(())
}

async fn ensure_writable_dir(path: &Path) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(path).await?;
    let probe = path.join(".selfcheck");
    tokio::fs::write(&probe, b"ok")
        .await
        .map_err(|e| anyhow::anyhow!("{} is not writable: {}", path.display(), e))?;
    tokio::fs::remove_file(&probe).await?;
    Ok(())
}

fn ensure_blender(program: &Path) -> anyhow::Result<()> {
    let resolved = check_blender(program)?;
    let output = std::process::Command::new(&resolved)
        .args(["-b", "--version"])
        .output()
        .map_err(|e| anyhow::anyhow!("blender not runnable: {}", e))?;

    if !output.status.success() {
        return Err(anyhow::anyhow!(
            "blender --version failed: {:?}",
            output.status
        ));
    }
    println!("worker-selfcheck: blender at {}", resolved.display());
    Ok(())
}

fn ensure_queue_env() -> anyhow::Result<()> {
    let backend: QueueBackend = match std::env::var("QUEUE_BACKEND") {
        Ok(value) => value.parse()?,
        Err(_) => QueueBackend::default(),
    };

    match backend {
        QueueBackend::Sqs => ensure_env_present(&["AWS_SQS_URL"]),
        QueueBackend::Redis => ensure_env_present(&["REDIS_URL"]),
        QueueBackend::Memory => Ok(()),
    }
}

fn ensure_env_present(vars: &[&str]) -> anyhow::Result<()> {
    for var in vars {
        if std::env::var(var).is_err() {
            return Err(anyhow::anyhow!("missing required env var {}", var));
        }
    }
    Ok(())
}
