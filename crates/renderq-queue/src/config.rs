//! Queue backend selection.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use tracing::info;

use crate::error::{QueueError, QueueResult};
use crate::memory::MemoryQueue;
use crate::sqs::{SqsConfig, SqsQueue};
use crate::streams::{RedisStreamConfig, RedisStreamQueue};
use crate::MessageQueue;

/// Which queue service to consume from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueueBackend {
    #[default]
    Sqs,
    Redis,
    Memory,
}

impl QueueBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueBackend::Sqs => "sqs",
            QueueBackend::Redis => "redis",
            QueueBackend::Memory => "memory",
        }
    }
}

impl fmt::Display for QueueBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueueBackend {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sqs" => Ok(QueueBackend::Sqs),
            "redis" => Ok(QueueBackend::Redis),
            "memory" => Ok(QueueBackend::Memory),
            other => Err(QueueError::config(format!("unknown QUEUE_BACKEND '{}'", other))),
        }
    }
}

/// Queue configuration.
#[derive(Debug, Clone)]
pub enum QueueConfig {
    Sqs(SqsConfig),
    Redis(RedisStreamConfig),
    Memory,
}

impl QueueConfig {
    /// Create config from environment variables.
    ///
    /// `QUEUE_BACKEND` picks the backend (default `sqs`); the backend's own
    /// variables are only read when it is selected.
    pub fn from_env() -> QueueResult<Self> {
        let backend = match std::env::var("QUEUE_BACKEND") {
            Ok(value) => value.parse()?,
            Err(_) => QueueBackend::default(),
        };

        Ok(match backend {
            QueueBackend::Sqs => QueueConfig::Sqs(SqsConfig::from_env()?),
            QueueBackend::Redis => QueueConfig::Redis(RedisStreamConfig::from_env()),
            QueueBackend::Memory => QueueConfig::Memory,
        })
    }

    pub fn backend(&self) -> QueueBackend {
        match self {
            QueueConfig::Sqs(_) => QueueBackend::Sqs,
            QueueConfig::Redis(_) => QueueBackend::Redis,
            QueueConfig::Memory => QueueBackend::Memory,
        }
    }
}

/// Build and initialise the configured backend.
pub async fn connect(config: QueueConfig) -> QueueResult<Arc<dyn MessageQueue>> {
    let queue: Arc<dyn MessageQueue> = match config {
        QueueConfig::Sqs(sqs) => Arc::new(SqsQueue::new(sqs).await?),
        QueueConfig::Redis(streams_config) => {
            let queue = RedisStreamQueue::new(streams_config)?;
            queue.init().await?;
            Arc::new(queue)
        }
        QueueConfig::Memory => Arc::new(MemoryQueue::new()),
    };

    info!("Connected to {} queue", queue.backend());
    Ok(queue)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_parsing() {
        assert_eq!("sqs".parse::<QueueBackend>().unwrap(), QueueBackend::Sqs);
        assert_eq!(" Redis ".parse::<QueueBackend>().unwrap(), QueueBackend::Redis);
        assert_eq!("memory".parse::<QueueBackend>().unwrap(), QueueBackend::Memory);
        assert!(matches!(
            "kafka".parse::<QueueBackend>(),
            Err(QueueError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_connect_memory() {
        let queue = connect(QueueConfig::Memory).await.unwrap();
        assert_eq!(queue.backend(), "memory");
    }
}
