//! Worker error types.

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Metrics exporter failed: {0}")]
    Metrics(String),

    #[error("Queue error: {0}")]
    Queue(#[from] renderq_queue::QueueError),

    #[error("Media error: {0}")]
    Media(#[from] renderq_media::MediaError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Queue transport failures end the poll loop; the process supervisor restarts us.
    pub fn is_transport(&self) -> bool {
        matches!(self, WorkerError::Queue(_))
    }
}
