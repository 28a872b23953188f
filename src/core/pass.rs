//! # One delivery pass: the ordered send loop for a locked outbox.
//!
//! Executes the per-batch portion of a delivery attempt against an already
//! locked state row, publishing delivery events to the [`Bus`].
//!
//! ## Flow
//! ```text
//! pending_messages(outbox, cursor, limit)      (ascending sequence)
//!   for each message:
//!     ├─ no destination → publish DestinationMissing, walk past
//!     ├─ send ok        → delete row, advance sent_seq, publish MessageSent
//!     └─ send fault     → publish SendFaulted, break
//!
//! after the loop:
//!   ├─ any send   → state.last_sequence_number = sent_seq
//!   └─ batch walked to the end AND not bounded by the limit
//!                 → state.delivered_at = now, publish OutboxDelivered
//! ```
//!
//! ## Rules
//! - Sends happen in strictly ascending `sequence_number` order; a fault
//!   halts the batch so no later message overtakes an earlier pending one.
//! - A missing destination is a permanent skip, not a fault: it does not
//!   block subsequent messages, and it is the only case where the cursor
//!   moves past an undelivered message. The skipped row stays until cleanup.
//! - Each send runs under `message_delivery_timeout` composed with the outer
//!   cancellation. Cancellation aborts the attempt; a timeout is an ordinary
//!   send fault.
//! - The drained decision is deferred whenever the batch was bounded by the
//!   limit; the next attempt reads an empty batch and decides then.

use std::time::{Duration, SystemTime};

use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::config::RelayConfig;
use crate::error::{SendError, StoreError};
use crate::events::{Bus, Event, EventKind};
use crate::outbox::OutboxState;
use crate::store::StoreSession;
use crate::transport::{Envelope, SendEndpoint, Transport, TransportRef};

/// What one delivery pass accomplished.
pub(crate) struct PassReport {
    /// Messages accepted by the broker during this pass.
    pub sent: u64,
    /// Whether the drained marker was set.
    pub delivered: bool,
}

impl PassReport {
    /// True when the pass moved the outbox forward in any durable way.
    pub fn progressed(&self) -> bool {
        self.sent > 0 || self.delivered
    }
}

/// Sends as many pending messages as the batch and the broker allow.
///
/// Mutates `state` in place; the caller persists it and commits.
pub(crate) async fn deliver_batch(
    session: &mut dyn StoreSession,
    transport: &TransportRef,
    state: &mut OutboxState,
    cfg: &RelayConfig,
    bus: &Bus,
    ctx: &CancellationToken,
) -> Result<PassReport, StoreError> {
    let outbox = state.outbox_id;
    let batch = session
        .pending_messages(outbox, state.cursor(), cfg.message_delivery_limit)
        .await?;

    let mut sent_seq: u64 = 0;
    let mut sent: u64 = 0;
    let mut walked: usize = 0;

    for message in &batch {
        if ctx.is_cancelled() {
            return Err(StoreError::Canceled);
        }

        let envelope = match Envelope::from_message(message) {
            Some(envelope) => envelope,
            None => {
                bus.publish(
                    Event::now(EventKind::DestinationMissing)
                        .with_outbox(outbox)
                        .with_message(message.message_id)
                        .with_sequence(message.sequence_number),
                );
                walked += 1;
                continue;
            }
        };

        match send_one(transport, envelope, cfg.message_delivery_timeout, ctx).await {
            Ok(()) => {
                session.delete_message(message.message_id).await?;
                sent_seq = message.sequence_number;
                sent += 1;
                walked += 1;
                bus.publish(
                    Event::now(EventKind::MessageSent)
                        .with_outbox(outbox)
                        .with_message(message.message_id)
                        .with_sequence(message.sequence_number),
                );
            }
            Err(SendError::Canceled) => return Err(StoreError::Canceled),
            Err(err) => {
                bus.publish(
                    Event::now(EventKind::SendFaulted)
                        .with_outbox(outbox)
                        .with_message(message.message_id)
                        .with_sequence(message.sequence_number)
                        .with_error(err.to_string()),
                );
                break;
            }
        }
    }

    if sent_seq > 0 {
        state.last_sequence_number = Some(sent_seq);
    }

    let delivered = walked == batch.len() && batch.len() < cfg.message_delivery_limit;
    if delivered {
        state.delivered_at = Some(SystemTime::now());
        bus.publish(Event::now(EventKind::OutboxDelivered).with_outbox(outbox));
    }

    Ok(PassReport { sent, delivered })
}

/// Resolves the endpoint and sends one envelope under a linked deadline.
async fn send_one(
    transport: &TransportRef,
    envelope: Envelope,
    deadline: Duration,
    ctx: &CancellationToken,
) -> Result<(), SendError> {
    let send = async {
        let endpoint = transport.endpoint(&envelope.destination).await?;
        endpoint.send(envelope, ctx).await
    };

    tokio::select! {
        res = timeout(deadline, send) => match res {
            Ok(outcome) => outcome,
            Err(_elapsed) => Err(SendError::Timeout { timeout: deadline }),
        },
        _ = ctx.cancelled() => Err(SendError::Canceled),
    }
}
