//! Queue message envelope.

use std::collections::HashMap;

/// One received message.
///
/// The receipt handle is only meaningful for deleting this particular
/// delivery; a redelivered message carries a different one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    /// Backend-assigned message identifier.
    pub message_id: String,
    /// Handle used to acknowledge (delete) this delivery.
    pub receipt_handle: String,
    /// Raw task body, if the message carried one.
    pub body: Option<String>,
    /// String-valued message attributes.
    pub attributes: HashMap<String, String>,
}

impl QueueMessage {
    pub fn new(
        message_id: impl Into<String>,
        receipt_handle: impl Into<String>,
        body: Option<String>,
    ) -> Self {
        Self {
            message_id: message_id.into(),
            receipt_handle: receipt_handle.into(),
            body,
            attributes: HashMap::new(),
        }
    }
}
