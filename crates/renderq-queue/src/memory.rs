//! In-process queue for local runs and tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use uuid::Uuid;

use crate::error::{QueueError, QueueResult};
use crate::message::QueueMessage;
use crate::MessageQueue;

#[derive(Debug, Default)]
struct MemoryState {
    pending: VecDeque<QueueMessage>,
    in_flight: HashMap<String, QueueMessage>,
    deleted: Vec<String>,
    receive_calls: usize,
    receive_error: Option<String>,
    delete_error: Option<String>,
}

/// FIFO queue with per-delivery receipt handles and a delete log.
#[derive(Debug, Default)]
pub struct MemoryQueue {
    state: Mutex<MemoryState>,
    notify: Notify,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a body; returns the message ID.
    pub fn push(&self, body: impl Into<String>) -> String {
        self.push_message(Some(body.into()))
    }

    /// Enqueue a message that may have no body.
    pub fn push_message(&self, body: Option<String>) -> String {
        let message_id = Uuid::new_v4().to_string();
        self.with_state(|state| {
            state
                .pending
                .push_back(QueueMessage::new(message_id.clone(), String::new(), body))
        });
        self.notify.notify_waiters();
        message_id
    }

    /// Make the next receive fail with `message`.
    pub fn fail_next_receive(&self, message: impl Into<String>) {
        self.with_state(|state| state.receive_error = Some(message.into()));
    }

    /// Make the next delete fail with `message`.
    pub fn fail_next_delete(&self, message: impl Into<String>) {
        self.with_state(|state| state.delete_error = Some(message.into()));
    }

    /// Message IDs in the order they were deleted.
    pub fn deleted(&self) -> Vec<String> {
        self.with_state(|state| state.deleted.clone())
    }

    pub fn pending_len(&self) -> usize {
        self.with_state(|state| state.pending.len())
    }

    /// Received but not yet deleted.
    pub fn in_flight_len(&self) -> usize {
        self.with_state(|state| state.in_flight.len())
    }

    pub fn receive_calls(&self) -> usize {
        self.with_state(|state| state.receive_calls)
    }

    /// Put every in-flight message back at the front, as a visibility timeout would.
    pub fn expire_in_flight(&self) -> usize {
        let count = self.with_state(|state| {
            let expired: Vec<QueueMessage> = state.in_flight.drain().map(|(_, m)| m).collect();
            let count = expired.len();
            for message in expired {
                state.pending.push_front(message);
            }
            count
        });
        if count > 0 {
            self.notify.notify_waiters();
        }
        count
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut MemoryState) -> T) -> T {
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut state)
    }

    fn try_take(&self) -> QueueResult<Option<QueueMessage>> {
        self.with_state(|state| {
            if let Some(error) = state.receive_error.take() {
                return Err(QueueError::receive_failed(error));
            }
            Ok(state.pending.pop_front().map(|mut message| {
                message.receipt_handle = Uuid::new_v4().to_string();
                state
                    .in_flight
                    .insert(message.receipt_handle.clone(), message.clone());
                message
            }))
        })
    }
}

#[async_trait]
impl MessageQueue for MemoryQueue {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn receive(&self, wait: Duration) -> QueueResult<Option<QueueMessage>> {
        self.with_state(|state| state.receive_calls += 1);

        let deadline = tokio::time::Instant::now() + wait;
        loop {
            // Register before checking so a push in between still wakes us.
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(message) = self.try_take()? {
                return Ok(Some(message));
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn delete(&self, message: &QueueMessage) -> QueueResult<()> {
        self.with_state(|state| {
            if let Some(error) = state.delete_error.take() {
                return Err(QueueError::delete_failed(error));
            }
            match state.in_flight.remove(&message.receipt_handle) {
                Some(removed) => {
                    state.deleted.push(removed.message_id);
                    Ok(())
                }
                None => Err(QueueError::delete_failed(format!(
                    "unknown receipt handle {}",
                    message.receipt_handle
                ))),
            }
        })
    }
}
