//! # The mutable per-outbox delivery cursor.
//!
//! [`OutboxState`] is lazily created on the first delivery attempt and updated
//! inside every committed attempt. It records how far delivery has progressed
//! (`last_sequence_number`), whether the outbox is drained (`delivered_at`),
//! and carries the concurrency-control fields (`version`, `lock_token`).
//!
//! ## Rules
//! - `version` strictly increases across committed replacements; stores guard
//!   replaces with `stored.version < new.version`.
//! - `lock_token` is rotated on every acquisition by lock-token stores; stores
//!   with native row locks leave it `None`.
//! - `delivered_at` is set only when a delivery pass walked a batch to the end
//!   and the batch was not bounded by the configured limit.

use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ids::OutboxId;

/// Opaque cooperative lease for stores without native row locks.
///
/// A fresh token is generated per acquisition; the stored value identifies
/// the current holder.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LockToken(Uuid);

impl LockToken {
    /// Generates a fresh token.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying uuid.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl From<Uuid> for LockToken {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

/// Per-outbox delivery cursor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboxState {
    /// The outbox this cursor belongs to; primary key.
    pub outbox_id: OutboxId,
    /// Sequence number of the last message accepted by the broker.
    pub last_sequence_number: Option<u64>,
    /// Set once the worker observed no further messages; triggers cleanup.
    pub delivered_at: Option<SystemTime>,
    /// Monotonic counter guarding optimistic replaces.
    pub version: u64,
    /// Current lease holder, for lock-token stores.
    pub lock_token: Option<LockToken>,
}

impl OutboxState {
    /// Creates the initial cursor inserted on the first attempt.
    pub fn fresh(outbox_id: OutboxId) -> Self {
        Self {
            outbox_id,
            last_sequence_number: None,
            delivered_at: None,
            version: 1,
            lock_token: None,
        }
    }

    /// The exclusive lower bound for the next pending-messages read.
    pub fn cursor(&self) -> u64 {
        self.last_sequence_number.unwrap_or(0)
    }

    /// True once the drained marker is set.
    pub fn is_delivered(&self) -> bool {
        self.delivered_at.is_some()
    }
}
