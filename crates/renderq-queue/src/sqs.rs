//! AWS SQS backend.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_sqs::config::Region;
use aws_sdk_sqs::error::DisplayErrorContext;
use aws_sdk_sqs::types::Message;
use aws_sdk_sqs::Client;
use tracing::{debug, info, warn};

use crate::error::{QueueError, QueueResult};
use crate::message::QueueMessage;
use crate::MessageQueue;

/// Longest long-poll SQS accepts.
pub const MAX_WAIT_SECS: u64 = 20;

/// Configuration for the SQS backend.
#[derive(Debug, Clone, Default)]
pub struct SqsConfig {
    /// Queue URL
    pub queue_url: String,
    /// Region; falls back to the default provider chain when unset
    pub region: Option<String>,
    /// Static access key; falls back to the default provider chain when unset
    pub access_key_id: Option<String>,
    /// Static secret key
    pub secret_access_key: Option<String>,
    /// Custom endpoint (LocalStack, ElasticMQ)
    pub endpoint_url: Option<String>,
}

impl SqsConfig {
    /// Create config from environment variables.
    pub fn from_env() -> QueueResult<Self> {
        Ok(Self {
            queue_url: std::env::var("AWS_SQS_URL")
                .map_err(|_| QueueError::config("AWS_SQS_URL not set"))?,
            region: non_empty_env("AWS_REGION"),
            access_key_id: non_empty_env("AWS_CREDENTIALS_ACCESS_KEY"),
            secret_access_key: non_empty_env("AWS_CREDENTIALS_SECRET_KEY"),
            endpoint_url: non_empty_env("AWS_SQS_ENDPOINT_URL"),
        })
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// SQS queue client.
#[derive(Debug, Clone)]
pub struct SqsQueue {
    client: Client,
    queue_url: String,
}

impl SqsQueue {
    /// Create a new SQS client from configuration.
    pub async fn new(config: SqsConfig) -> QueueResult<Self> {
        if config.queue_url.trim().is_empty() {
            return Err(QueueError::config("SQS queue URL is empty"));
        }

        let mut loader = aws_config::defaults(BehaviorVersion::latest());

        if let Some(region) = config.region.clone() {
            loader = loader.region(Region::new(region));
        }

        match (&config.access_key_id, &config.secret_access_key) {
            (Some(access_key), Some(secret_key)) => {
                let credentials =
                    Credentials::new(access_key, secret_key, None, None, "renderq-env");
                loader = loader.credentials_provider(credentials);
            }
            (None, None) => {}
            _ => {
                return Err(QueueError::config(
                    "AWS_CREDENTIALS_ACCESS_KEY and AWS_CREDENTIALS_SECRET_KEY must be set together",
                ))
            }
        }

        if let Some(endpoint) = &config.endpoint_url {
            loader = loader.endpoint_url(endpoint);
        }

        let sdk_config = loader.load().await;
        let client = Client::new(&sdk_config);

        info!("SQS queue client ready for {}", config.queue_url);

        Ok(Self {
            client,
            queue_url: config.queue_url,
        })
    }

    /// Create from environment variables.
    pub async fn from_env() -> QueueResult<Self> {
        Self::new(SqsConfig::from_env()?).await
    }
}

#[async_trait]
impl MessageQueue for SqsQueue {
    fn backend(&self) -> &'static str {
        "sqs"
    }

    async fn receive(&self, wait: Duration) -> QueueResult<Option<QueueMessage>> {
        let output = self
            .client
            .receive_message()
            .queue_url(&self.queue_url)
            .max_number_of_messages(1)
            .wait_time_seconds(long_poll_secs(wait))
            .message_attribute_names("All")
            .send()
            .await
            .map_err(|e| QueueError::receive_failed(DisplayErrorContext(&e).to_string()))?;

        let Some(message) = output.messages().first() else {
            return Ok(None);
        };

        match convert_message(message) {
            Some(message) => {
                debug!("Received SQS message {}", message.message_id);
                Ok(Some(message))
            }
            None => {
                warn!(
                    "Ignoring SQS message {:?} without a receipt handle",
                    message.message_id()
                );
                Ok(None)
            }
        }
    }

    async fn delete(&self, message: &QueueMessage) -> QueueResult<()> {
        self.client
            .delete_message()
            .queue_url(&self.queue_url)
            .receipt_handle(&message.receipt_handle)
            .send()
            .await
            .map_err(|e| QueueError::delete_failed(DisplayErrorContext(&e).to_string()))?;

        debug!("Deleted SQS message {}", message.message_id);
        Ok(())
    }
}

/// Clamp a wait to what SQS accepts.
fn long_poll_secs(wait: Duration) -> i32 {
    wait.as_secs().min(MAX_WAIT_SECS) as i32
}

fn convert_message(message: &Message) -> Option<QueueMessage> {
    let receipt_handle = message.receipt_handle()?.to_string();
    let message_id = message.message_id().unwrap_or_default().to_string();

    let attributes: HashMap<String, String> = message
        .message_attributes()
        .map(|attrs| {
            attrs
                .iter()
                .filter_map(|(key, value)| {
                    value
                        .string_value()
                        .map(|v| (key.clone(), v.to_string()))
                })
                .collect()
        })
        .unwrap_or_default();

    Some(QueueMessage {
        message_id,
        receipt_handle,
        body: message.body().map(str::to_string),
        attributes,
    })
}
