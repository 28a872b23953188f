//! Runtime events: types and broadcast bus.
//!
//! This module groups the event **data model** and the **bus** used to
//! publish/subscribe to events emitted by the dispatcher, the per-outbox
//! workers, the delivery pass, and the subscriber workers themselves.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `Relay` (dispatcher + lifecycle), `DeliveryWorker`,
//!   the attempt/pass functions, `SubscriberSet` workers (overflow/panic).
//! - **Consumers**: `Relay::subscriber_listener()` (fans out to the
//!   `SubscriberSet` and updates the `ActiveTracker`).
//!
//! See `core/mod.rs` for the system-level wiring diagram.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
