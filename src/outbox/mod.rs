//! Outbox data model: ids, message rows, and the per-outbox cursor state.
//!
//! These types are the shared vocabulary between the store adapters and the
//! delivery core:
//! - [`OutboxId`] / [`MessageId`] identity newtypes
//! - [`OutboxMessage`] / [`MessageBody`] the immutable queued row
//! - [`OutboxState`] / [`LockToken`] the mutable delivery cursor
//!
//! Rows are produced by the application (inside its own transaction, outside
//! this crate) and consumed here; the relay never mutates a message row, it
//! only deletes it after the broker acknowledged the send.

mod ids;
mod message;
mod state;

pub use ids::{MessageId, OutboxId};
pub use message::{MessageBody, OutboxMessage};
pub use state::{LockToken, OutboxState};
