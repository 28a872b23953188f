//! # Error types used by the relay runtime and its adapters.
//!
//! This module defines three error enums:
//!
//! - [`StoreError`] faults raised by the transactional store adapter.
//! - [`SendError`] faults raised by the transport while resolving or sending.
//! - [`RelayError`] errors raised by the relay host itself.
//!
//! All types provide `as_label` helpers for logs/metrics. [`StoreError`] has
//! additional predicates: `is_contention()` and `is_retryable()`.
//!
//! Send faults never cross an attempt boundary: the delivery pass absorbs them
//! by breaking the per-message loop, so only store faults (and cancellation)
//! propagate out of a worker.

use std::time::Duration;

use thiserror::Error;

/// # Faults raised by the transactional store adapter.
///
/// Store implementations map their native failures onto these variants; the
/// worker's retry policy is driven entirely by this classification.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum StoreError {
    /// The outbox state row is currently held by another relay instance.
    ///
    /// Raised by the lock-token strategy when the token compare-and-set loses,
    /// and by row-lock stores that fail fast instead of blocking.
    #[error("outbox state row is locked by another relay instance")]
    LockBusy,

    /// An optimistic guard rejected a write (stored version was not older).
    #[error("optimistic concurrency conflict: stored version >= {version}")]
    Conflict {
        /// The version the replacement carried.
        version: u64,
    },

    /// The transaction exceeded its configured deadline.
    #[error("store transaction timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    /// Backend command failure (connection loss, statement error, ...).
    #[error("store backend failure: {reason}")]
    Backend { reason: String },

    /// The attempt was canceled due to shutdown or parent cancellation.
    ///
    /// Not an error in the traditional sense; signals intentional unwinding.
    #[error("context canceled")]
    Canceled,
}

impl StoreError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            StoreError::LockBusy => "store_lock_busy",
            StoreError::Conflict { .. } => "store_conflict",
            StoreError::Timeout { .. } => "store_timeout",
            StoreError::Backend { .. } => "store_backend",
            StoreError::Canceled => "store_canceled",
        }
    }

    /// True for faults that mean "another holder won the row", detected before
    /// any message was sent. Safe to retry under either lock strategy.
    pub fn is_contention(&self) -> bool {
        matches!(self, StoreError::LockBusy | StoreError::Conflict { .. })
    }

    /// Indicates whether re-running the whole attempt may succeed.
    ///
    /// Whether the worker actually does so depends on the store's declared
    /// retry policy; see [`Store::retries_attempts`](crate::Store::retries_attempts).
    pub fn is_retryable(&self) -> bool {
        !matches!(self, StoreError::Canceled)
    }

    /// Convenience constructor for backend failures.
    pub fn backend(reason: impl Into<String>) -> Self {
        StoreError::Backend {
            reason: reason.into(),
        }
    }
}

/// # Faults raised by the transport adapter.
///
/// These represent failures to resolve an endpoint or to get a message
/// acknowledged by the broker within its deadline.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum SendError {
    /// The destination address could not be resolved to a send endpoint.
    #[error("no send endpoint for address '{address}'")]
    EndpointUnresolved { address: String },

    /// The broker rejected the message or the connection failed mid-send.
    #[error("send rejected: {reason}")]
    Rejected { reason: String },

    /// The broker did not acknowledge within the per-send deadline.
    #[error("send timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    /// The send was canceled due to shutdown or parent cancellation.
    #[error("context canceled")]
    Canceled,
}

impl SendError {
    /// Returns a short stable label.
    pub fn as_label(&self) -> &'static str {
        match self {
            SendError::EndpointUnresolved { .. } => "send_unresolved",
            SendError::Rejected { .. } => "send_rejected",
            SendError::Timeout { .. } => "send_timeout",
            SendError::Canceled => "send_canceled",
        }
    }
}

/// # Errors produced by the relay host.
///
/// These represent failures of the hosting layer, not of delivery itself;
/// delivery faults are absorbed and retried on a later poll.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RelayError {
    /// Shutdown grace period was exceeded; some workers remained in flight.
    #[error("shutdown grace {grace:?} exceeded; stuck outboxes: {stuck:?}")]
    GraceExceeded {
        /// The configured grace duration.
        grace: Duration,
        /// Outbox ids whose workers did not settle in time.
        stuck: Vec<crate::outbox::OutboxId>,
    },

    /// OS signal listener registration failed.
    #[error("failed to register shutdown signal handler: {0}")]
    Signal(#[from] std::io::Error),
}

impl RelayError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            RelayError::GraceExceeded { .. } => "relay_grace_exceeded",
            RelayError::Signal(_) => "relay_signal",
        }
    }
}
