//! # The immutable message row queued by the producer.
//!
//! An [`OutboxMessage`] is inserted by the application in the same transaction
//! as its business state change and never mutated afterwards. The relay reads
//! it, hands its body to the transport, and deletes the row once the broker
//! acknowledged the send.
//!
//! ## Rules
//! - `sequence_number` is assigned by the producer, monotonically increasing
//!   and unique within one `outbox_id`.
//! - `outbox_id` may be `None` for rows that belong to a different,
//!   non-grouped pathway; the relay ignores such rows.
//! - `destination_address` may be `None` (malformed row); the delivery pass
//!   skips it with a warning instead of faulting.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::ids::{MessageId, OutboxId};

/// Serialized payload plus transport headers.
///
/// Opaque to the relay; only the transport's serializer interprets it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageBody {
    /// Transport headers carried alongside the payload.
    pub headers: HashMap<String, String>,
    /// The serialized message payload.
    pub payload: Vec<u8>,
}

impl MessageBody {
    /// Creates a body with the given payload and no headers.
    pub fn new(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            headers: HashMap::new(),
            payload: payload.into(),
        }
    }

    /// Adds a header.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }
}

/// One queued message row.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboxMessage {
    /// Group key; rows with `None` are invisible to the relay.
    pub outbox_id: Option<OutboxId>,
    /// Unique row identifier, primary key for deletion.
    pub message_id: MessageId,
    /// Producer-assigned ordering key, unique within `outbox_id`.
    pub sequence_number: u64,
    /// Routable destination; `None` marks a malformed row that is skipped.
    pub destination_address: Option<String>,
    /// Opaque payload and headers.
    pub body: MessageBody,
}

impl OutboxMessage {
    /// Builds a well-formed grouped row.
    pub fn new(
        outbox_id: OutboxId,
        sequence_number: u64,
        destination_address: impl Into<String>,
        body: MessageBody,
    ) -> Self {
        Self {
            outbox_id: Some(outbox_id),
            message_id: MessageId::generate(),
            sequence_number,
            destination_address: Some(destination_address.into()),
            body,
        }
    }
}
