//! Message queue backends for render tasks.
//!
//! This crate provides:
//! - The [`MessageQueue`] receive/delete contract
//! - AWS SQS, Redis Streams and in-memory backends
//! - Backend selection from environment variables

use std::time::Duration;

use async_trait::async_trait;

pub mod config;
pub mod error;
pub mod memory;
pub mod message;
pub mod sqs;
pub mod streams;

pub use config::{connect, QueueBackend, QueueConfig};
pub use error::{QueueError, QueueResult};
pub use memory::MemoryQueue;
pub use message::QueueMessage;
pub use sqs::{SqsConfig, SqsQueue};
pub use streams::{RedisStreamConfig, RedisStreamQueue};

/// At-least-once delivery channel for task messages.
///
/// A received message stays invisible to other consumers until it is deleted
/// or the backend's visibility timeout returns it to the queue.
#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Short backend label for logs.
    fn backend(&self) -> &'static str;

    /// Receive at most one message, long-polling for up to `wait`.
    async fn receive(&self, wait: Duration) -> QueueResult<Option<QueueMessage>>;

    /// Acknowledge a delivery by its receipt handle.
    async fn delete(&self, message: &QueueMessage) -> QueueResult<()>;
}
