//! Redis Streams backend.
//!
//! Each stream entry carries the raw task body under the `body` field. The
//! stream entry ID doubles as the receipt handle; deleting a message acks it
//! for the consumer group and removes it from the stream.
//!
//! An entry that is received but never deleted stays in the group's pending
//! list. Once it has been idle for the visibility timeout, the next receive
//! by any consumer claims it and delivers it again. Requires Redis 6.2+
//! (`XPENDING ... IDLE`).

use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use tracing::{debug, info};

use crate::error::{QueueError, QueueResult};
use crate::message::QueueMessage;
use crate::MessageQueue;

/// Stream field holding the task body.
pub const BODY_FIELD: &str = "body";

/// Redis Streams queue configuration.
#[derive(Debug, Clone)]
pub struct RedisStreamConfig {
    /// Redis URL
    pub redis_url: String,
    /// Stream name for tasks
    pub stream_name: String,
    /// Consumer group name
    pub consumer_group: String,
    /// This worker's consumer name
    pub consumer_name: String,
    /// How long a delivered entry may stay unacknowledged before redelivery
    pub visibility_timeout: Duration,
}

impl Default for RedisStreamConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            stream_name: "renderq:tasks".to_string(),
            consumer_group: "renderq:workers".to_string(),
            consumer_name: format!("worker-{}", uuid::Uuid::new_v4()),
            visibility_timeout: Duration::from_secs(600),
        }
    }
}

impl RedisStreamConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            redis_url: std::env::var("REDIS_URL").unwrap_or(defaults.redis_url),
            stream_name: std::env::var("QUEUE_STREAM").unwrap_or(defaults.stream_name),
            consumer_group: std::env::var("QUEUE_CONSUMER_GROUP")
                .unwrap_or(defaults.consumer_group),
            consumer_name: std::env::var("QUEUE_CONSUMER_NAME").unwrap_or(defaults.consumer_name),
            visibility_timeout: std::env::var("QUEUE_VISIBILITY_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.visibility_timeout),
        }
    }
}

/// Redis Streams queue client.
pub struct RedisStreamQueue {
    client: redis::Client,
    config: RedisStreamConfig,
}

impl RedisStreamQueue {
    /// Create a new queue client.
    pub fn new(config: RedisStreamConfig) -> QueueResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self { client, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> QueueResult<Self> {
        Self::new(RedisStreamConfig::from_env())
    }

    /// Initialize the queue (create consumer group if not exists).
    pub async fn init(&self) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let result: Result<(), redis::RedisError> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg("$")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match result {
            Ok(_) => info!("Created consumer group: {}", self.config.consumer_group),
            Err(e) if e.to_string().contains("BUSYGROUP") => {
                debug!("Consumer group already exists: {}", self.config.consumer_group);
            }
            Err(e) => return Err(QueueError::Redis(e)),
        }

        Ok(())
    }

    /// Append a raw task body to the stream.
    pub async fn enqueue(&self, body: &str) -> QueueResult<String> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let message_id: String = redis::cmd("XADD")
            .arg(&self.config.stream_name)
            .arg("*")
            .arg(BODY_FIELD)
            .arg(body)
            .query_async(&mut conn)
            .await
            .map_err(|e| QueueError::enqueue_failed(e.to_string()))?;

        debug!("Enqueued message {}", message_id);
        Ok(message_id)
    }

    /// Get stream length.
    pub async fn len(&self) -> QueueResult<u64> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let len: u64 = conn.xlen(&self.config.stream_name).await?;
        Ok(len)
    }

    /// Claim one pending entry idle for longer than the visibility timeout.
    ///
    /// `XCLAIM` re-checks the idle time, so when two consumers race for the
    /// same entry only one of them gets it.
    async fn claim_idle(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
    ) -> Result<Option<QueueMessage>, redis::RedisError> {
        let min_idle = min_idle_millis(self.config.visibility_timeout);

        let pending: redis::streams::StreamPendingCountReply = redis::cmd("XPENDING")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg("IDLE")
            .arg(min_idle)
            .arg("-")
            .arg("+")
            .arg(1)
            .query_async(conn)
            .await?;

        let Some(stale) = pending.ids.into_iter().next() else {
            return Ok(None);
        };

        let claimed: redis::streams::StreamClaimReply = redis::cmd("XCLAIM")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(&self.config.consumer_name)
            .arg(min_idle)
            .arg(&stale.id)
            .query_async(conn)
            .await?;

        Ok(claimed.ids.into_iter().next().map(|entry| {
            info!(
                "Claimed message {} from {} after {} delivery attempt(s)",
                entry.id, stale.consumer, stale.times_delivered
            );
            to_message(entry)
        }))
    }
}

#[async_trait]
impl MessageQueue for RedisStreamQueue {
    fn backend(&self) -> &'static str {
        "redis"
    }

    async fn receive(&self, wait: Duration) -> QueueResult<Option<QueueMessage>> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| QueueError::receive_failed(e.to_string()))?;

        if let Some(message) = self
            .claim_idle(&mut conn)
            .await
            .map_err(|e| QueueError::receive_failed(e.to_string()))?
        {
            return Ok(Some(message));
        }

        let result: redis::streams::StreamReadReply = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(&self.config.consumer_group)
            .arg(&self.config.consumer_name)
            .arg("COUNT")
            .arg(1)
            .arg("BLOCK")
            .arg(block_millis(wait))
            .arg("STREAMS")
            .arg(&self.config.stream_name)
            .arg(">") // Only new messages
            .query_async(&mut conn)
            .await
            .map_err(|e| QueueError::receive_failed(e.to_string()))?;

        let entry = result
            .keys
            .into_iter()
            .flat_map(|stream_key| stream_key.ids)
            .next();

        Ok(entry.map(|entry| {
            debug!("Consumed message {} from stream", entry.id);
            to_message(entry)
        }))
    }

    async fn delete(&self, message: &QueueMessage) -> QueueResult<()> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| QueueError::delete_failed(e.to_string()))?;

        redis::cmd("XACK")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(&message.receipt_handle)
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| QueueError::delete_failed(e.to_string()))?;

        redis::cmd("XDEL")
            .arg(&self.config.stream_name)
            .arg(&message.receipt_handle)
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| QueueError::delete_failed(e.to_string()))?;

        debug!("Acknowledged message: {}", message.message_id);
        Ok(())
    }
}

fn to_message(entry: redis::streams::StreamId) -> QueueMessage {
    let body = match entry.map.get(BODY_FIELD) {
        Some(redis::Value::BulkString(payload)) => {
            Some(String::from_utf8_lossy(payload).into_owned())
        }
        _ => None,
    };
    QueueMessage::new(entry.id.clone(), entry.id, body)
}

/// Idle threshold for reclaiming; a zero threshold would steal in-flight entries.
fn min_idle_millis(timeout: Duration) -> u64 {
    (timeout.as_millis() as u64).max(1)
}

/// `BLOCK 0` means forever in Redis, so never go below one millisecond.
fn block_millis(wait: Duration) -> u64 {
    (wait.as_millis() as u64).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_millis_never_zero() {
        assert_eq!(block_millis(Duration::ZERO), 1);
        assert_eq!(block_millis(Duration::from_secs(10)), 10_000);
    }

    #[test]
    fn test_default_consumer_names_unique() {
        let a = RedisStreamConfig::default();
        let b = RedisStreamConfig::default();
        assert_ne!(a.consumer_name, b.consumer_name);
        assert_eq!(a.stream_name, "renderq:tasks");
        assert_eq!(a.visibility_timeout, Duration::from_secs(600));
    }

    #[test]
    fn test_min_idle_never_zero() {
        assert_eq!(min_idle_millis(Duration::ZERO), 1);
        assert_eq!(min_idle_millis(Duration::from_secs(2)), 2_000);
    }

    #[test]
    fn test_entry_without_body_field() {
        let mut map = std::collections::HashMap::new();
        map.insert("other".to_string(), redis::Value::BulkString(b"x".to_vec()));
        let message = to_message(redis::streams::StreamId {
            id: "1-0".to_string(),
            map,
        });
        assert_eq!(message.receipt_handle, "1-0");
        assert!(message.body.is_none());
    }
}
