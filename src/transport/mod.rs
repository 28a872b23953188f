//! # Transport adapter: the message-bus side of the relay.
//!
//! The relay does not speak any broker protocol itself. It consumes three
//! operations from a [`Transport`] implementation:
//!
//! - [`Transport::wait_until_ready`] suspends until the broker connection is
//!   healthy (or the wait is canceled); the dispatcher gates every polling
//!   pass on it.
//! - [`Transport::endpoint`] resolves a destination address to a reusable
//!   [`SendEndpoint`].
//! - [`SendEndpoint::send`] emits one [`Envelope`] and resolves only after
//!   broker acknowledgement.
//!
//! ## Rules
//! - `send` must not resolve `Ok` before the broker acknowledged the message;
//!   the store row is deleted on the strength of that acknowledgement.
//! - Implementations must honor the cancellation token at every await point.
//! - Endpoint handles may be cached by address; the relay resolves per send.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::SendError;
use crate::outbox::{MessageId, OutboxId, OutboxMessage};

/// Shared handle to a transport object.
pub type TransportRef = Arc<dyn Transport>;

/// Outbound message assembled from a stored row.
///
/// The wire format is the transport's concern; the relay only copies the
/// stored headers and payload across.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Envelope {
    /// Identifier of the originating row.
    pub message_id: MessageId,
    /// Group the message belongs to.
    pub outbox_id: OutboxId,
    /// Position within the group.
    pub sequence_number: u64,
    /// Resolved destination address.
    pub destination: String,
    /// Transport headers from the stored body.
    pub headers: HashMap<String, String>,
    /// Serialized payload from the stored body.
    pub payload: Vec<u8>,
}

impl Envelope {
    /// Builds an envelope from a stored message row.
    ///
    /// Returns `None` when the row has no destination address or no group;
    /// such rows are never handed to the transport.
    pub fn from_message(message: &OutboxMessage) -> Option<Self> {
        let destination = message.destination_address.clone()?;
        let outbox_id = message.outbox_id?;
        Some(Self {
            message_id: message.message_id,
            outbox_id,
            sequence_number: message.sequence_number,
            destination,
            headers: message.body.headers.clone(),
            payload: message.body.payload.clone(),
        })
    }
}

/// A reusable send handle for one destination address.
#[async_trait]
pub trait SendEndpoint: Send + Sync {
    /// Emits one envelope, resolving only after broker acknowledgement.
    ///
    /// Implementations must return [`SendError::Canceled`] promptly when the
    /// token fires; the per-send deadline itself is enforced by the caller.
    async fn send(&self, envelope: Envelope, ctx: &CancellationToken) -> Result<(), SendError>;
}

/// The message-bus client surface the relay consumes.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Suspends until the broker connection is healthy.
    ///
    /// Returns [`SendError::Canceled`] when the token fires first.
    async fn wait_until_ready(&self, ctx: &CancellationToken) -> Result<(), SendError>;

    /// Resolves a destination address to a send endpoint.
    async fn endpoint(&self, address: &str) -> Result<Arc<dyn SendEndpoint>, SendError>;
}
