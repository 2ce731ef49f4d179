//! Live queue backend tests.

use std::time::Duration;

use renderq_queue::{MessageQueue, RedisStreamConfig, RedisStreamQueue, SqsQueue};

/// Test enqueue, receive and delete against a real Redis.
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_redis_receive_delete_cycle() {
    dotenvy::dotenv().ok();

    let queue = RedisStreamQueue::from_env().expect("Failed to create queue");
    queue.init().await.expect("Failed to initialize queue");

    let body = r#"{"rawFileUrl":"http://x/a.blend","taskType":"image","renderResolutionWidth":1920,"renderResolutionHeight":1080,"renderResolutionPercentage":100,"frameToRender":5}"#;
    let message_id = queue.enqueue(body).await.expect("Failed to enqueue");

    let message = queue
        .receive(Duration::from_secs(1))
        .await
        .expect("Failed to receive")
        .expect("No message received");

    assert_eq!(message.message_id, message_id);
    assert_eq!(message.body.as_deref(), Some(body));

    queue.delete(&message).await.expect("Failed to delete");
}

/// Test an empty long poll against a real Redis.
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_redis_empty_poll() {
    dotenvy::dotenv().ok();

    let queue = RedisStreamQueue::from_env().expect("Failed to create queue");
    queue.init().await.expect("Failed to initialize queue");

    let len = queue.len().await.expect("Failed to get queue length");
    println!("Stream length before poll: {}", len);

    // Drain anything left from earlier runs, then expect an empty poll.
    while let Some(message) = queue.receive(Duration::from_millis(100)).await.unwrap() {
        queue.delete(&message).await.unwrap();
    }
    assert!(queue.receive(Duration::from_millis(100)).await.unwrap().is_none());
}

/// A received but unacknowledged entry comes back once it has been idle
/// for the visibility timeout.
#[tokio::test]
#[ignore = "requires Redis 6.2+"]
async fn test_redis_redelivers_after_visibility_timeout() {
    dotenvy::dotenv().ok();

    let config = RedisStreamConfig {
        visibility_timeout: Duration::from_millis(200),
        ..RedisStreamConfig::from_env()
    };
    let queue = RedisStreamQueue::new(config).expect("Failed to create queue");
    queue.init().await.expect("Failed to initialize queue");

    while let Some(message) = queue.receive(Duration::from_millis(100)).await.unwrap() {
        queue.delete(&message).await.unwrap();
    }

    let body = r#"{"rawFileUrl":"http://x/a.blend","taskType":"animation","renderResolutionWidth":640,"renderResolutionHeight":480,"renderResolutionPercentage":50,"frameStart":1,"frameEnd":2}"#;
    let message_id = queue.enqueue(body).await.expect("Failed to enqueue");

    let first = queue
        .receive(Duration::from_secs(1))
        .await
        .expect("Failed to receive")
        .expect("No message received");
    assert_eq!(first.message_id, message_id);
    drop(first);

    // Still in flight: a poll inside the timeout sees nothing.
    assert!(queue.receive(Duration::from_millis(10)).await.unwrap().is_none());

    tokio::time::sleep(Duration::from_millis(400)).await;

    let again = queue
        .receive(Duration::from_secs(1))
        .await
        .expect("Failed to receive")
        .expect("Message was not redelivered");
    assert_eq!(again.message_id, message_id);
    assert_eq!(again.body.as_deref(), Some(body));

    queue.delete(&again).await.expect("Failed to delete");
}

/// Test a long poll against SQS (or LocalStack via AWS_SQS_ENDPOINT_URL).
#[tokio::test]
#[ignore = "requires SQS"]
async fn test_sqs_poll() {
    dotenvy::dotenv().ok();

    let queue = SqsQueue::from_env().await.expect("Failed to create SQS client");
    let received = queue
        .receive(Duration::from_secs(1))
        .await
        .expect("Failed to receive");

    if let Some(message) = received {
        println!("Received message {}", message.message_id);
        assert!(!message.receipt_handle.is_empty());
    }
}
