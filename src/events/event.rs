//! # Runtime events emitted by the relay.
//!
//! The [`EventKind`] enum classifies event types across four categories:
//! - **Delivery events**: the per-message outcomes of a delivery pass
//! - **Worker events**: per-outbox worker lifecycle
//! - **Dispatcher events**: pass-level faults and shutdown flow
//! - **Subscriber events**: fan-out overflow and panic isolation
//!
//! The [`Event`] struct carries optional metadata such as the outbox and
//! message ids, the message sequence number, deleted-row counts, attempt
//! counters, delays, and error messages.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases
//! monotonically. This guarantees that events can be ordered correctly even
//! when delivered out-of-order through async channels.
//!
//! ## Event flow examples
//!
//! ### Drain of one outbox (happy path)
//! ```text
//! WorkerStarting
//!   → MessageSent (per message, ascending sequence)
//!   → OutboxDelivered
//!   → OutboxRemoved        (cleanup on the next attempt)
//!   → WorkerStopped
//! ```
//!
//! ### Send fault mid-batch
//! ```text
//! MessageSent (partial progress)
//!   → SendFaulted          (loop breaks; progress commits)
//!   → WorkerStopped        (retried on a later pass)
//! ```
//!
//! ## Example
//! ```rust
//! use outboxvisor::{Event, EventKind, OutboxId};
//!
//! let outbox = OutboxId::generate();
//! let ev = Event::now(EventKind::SendFaulted)
//!     .with_outbox(outbox)
//!     .with_sequence(7)
//!     .with_error("broker unavailable");
//!
//! assert_eq!(ev.kind, EventKind::SendFaulted);
//! assert_eq!(ev.outbox, Some(outbox));
//! assert_eq!(ev.error.as_deref(), Some("broker unavailable"));
//! ```

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

use crate::outbox::{MessageId, OutboxId};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    SubscriberPanicked,
    /// Subscriber dropped an event (queue full or worker closed).
    SubscriberOverflow,

    // === Shutdown events ===
    /// Shutdown requested (OS signal received or host canceled).
    ShutdownRequested,
    /// All workers settled within the configured grace period.
    AllStoppedWithin,
    /// Grace period exceeded; some workers did not settle in time.
    GraceExceeded,

    // === Dispatcher events ===
    /// A polling pass failed before workers were spawned (scan error).
    PassFaulted,

    // === Worker lifecycle events ===
    /// A per-outbox worker is starting an attempt.
    WorkerStarting,
    /// A per-outbox worker finished (drained, deferred, or canceled).
    WorkerStopped,
    /// A per-outbox worker exited with a store fault.
    WorkerFaulted,
    /// A contended lock acquisition is scheduled for retry after a delay.
    LockRetryScheduled,

    // === Delivery events ===
    /// A message was accepted by the broker and its row deleted.
    MessageSent,
    /// A send failed; the batch loop broke and the message stays queued.
    SendFaulted,
    /// A row without a destination address was skipped.
    DestinationMissing,
    /// The drained marker was set for an outbox.
    OutboxDelivered,
    /// Cleanup removed an outbox's rows; `count` carries how many.
    OutboxRemoved,
    /// A transaction rollback itself failed; the primary fault still wins.
    RollbackFaulted,
}

/// Runtime event with optional metadata.
///
/// Carries information about delivery progress, worker lifecycle, faults,
/// retry delays, and timing.
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    /// Used to determine event ordering across async boundaries.
    pub seq: u64,
    /// Wall-clock timestamp (may go backwards, use for logging only).
    pub at: SystemTime,
    /// The kind of event.
    pub kind: EventKind,
    /// Outbox the event concerns, if applicable.
    pub outbox: Option<OutboxId>,
    /// Message the event concerns, if applicable.
    pub message: Option<MessageId>,
    /// Message sequence number, if applicable.
    pub sequence: Option<u64>,
    /// Row count for cleanup events.
    pub count: Option<u64>,
    /// Attempt counter (starting from 1).
    pub attempt: Option<u64>,
    /// Retry delay before the next attempt (if relevant).
    pub delay: Option<Duration>,
    /// Deadline that was exceeded (if relevant).
    pub timeout: Option<Duration>,
    /// Error message, if the event represents a failure.
    pub error: Option<String>,
}

impl Event {
    /// Creates a new event of the given kind with the current timestamp and
    /// next sequence number.
    pub fn now(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            outbox: None,
            message: None,
            sequence: None,
            count: None,
            attempt: None,
            delay: None,
            timeout: None,
            error: None,
        }
    }

    /// Attaches an outbox id.
    pub fn with_outbox(mut self, id: OutboxId) -> Self {
        self.outbox = Some(id);
        self
    }

    /// Attaches a message id.
    pub fn with_message(mut self, id: MessageId) -> Self {
        self.message = Some(id);
        self
    }

    /// Attaches a message sequence number.
    pub fn with_sequence(mut self, seq: u64) -> Self {
        self.sequence = Some(seq);
        self
    }

    /// Attaches a row count.
    pub fn with_count(mut self, n: u64) -> Self {
        self.count = Some(n);
        self
    }

    /// Attaches an attempt count.
    pub fn with_attempt(mut self, n: u64) -> Self {
        self.attempt = Some(n);
        self
    }

    /// Attaches a retry delay.
    pub fn with_delay(mut self, d: Duration) -> Self {
        self.delay = Some(d);
        self
    }

    /// Attaches an exceeded deadline.
    pub fn with_timeout(mut self, d: Duration) -> Self {
        self.timeout = Some(d);
        self
    }

    /// Attaches an error message.
    pub fn with_error(mut self, msg: impl Into<String>) -> Self {
        self.error = Some(msg.into());
        self
    }

    /// Creates a subscriber overflow event.
    ///
    /// Emitted when a subscriber's queue is full and an event is dropped.
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::now(EventKind::SubscriberOverflow)
            .with_error(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    ///
    /// Emitted when a subscriber panics during event processing.
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::now(EventKind::SubscriberPanicked)
            .with_error(format!("subscriber={subscriber} panic={info}"))
    }
}
