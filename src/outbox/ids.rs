//! # Identity newtypes for outbox rows.
//!
//! - [`OutboxId`] groups messages that must be delivered in order (typically
//!   the originating aggregate or conversation).
//! - [`MessageId`] uniquely identifies one message row; primary key for
//!   per-message deletion.
//!
//! Both wrap a [`Uuid`] so they stay opaque to the core: nothing in the relay
//! orders or interprets them beyond equality and hashing.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Logical group key for messages delivered in order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OutboxId(Uuid);

impl OutboxId {
    /// Wraps an existing identifier.
    pub fn new(id: Uuid) -> Self {
        Self(id)
    }

    /// Generates a random identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying uuid.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for OutboxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<Uuid> for OutboxId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

/// Globally unique identifier of one message row.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(Uuid);

impl MessageId {
    /// Wraps an existing identifier.
    pub fn new(id: Uuid) -> Self {
        Self(id)
    }

    /// Generates a random identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying uuid.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<Uuid> for MessageId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}
