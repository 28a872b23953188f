//! # Event bus for broadcasting runtime events.
//!
//! [`Bus`] is a wrapper around [`tokio::sync::broadcast`] that lets the
//! dispatcher and the delivery workers broadcast [`Event`]s to multiple
//! subscribers simultaneously.
//!
//! ## Key characteristics:
//! - **Broadcast semantics**: all active subscribers receive a clone of each event
//! - **Non-persistent**: events are lost if there are no active subscribers
//! - **Bounded capacity**: old events are dropped when the channel is full
//! - **Multiple subscribers**: any number of receivers can subscribe independently
//!
//! ## Usage:
//! - [`Bus::publish`] broadcasts an event to all current subscribers (non-blocking)
//! - [`Bus::subscribe`] creates a new receiver that will receive all future events
//!
//! Used internally by the [`Relay`](crate::Relay) to deliver delivery and
//! lifecycle events to subscribers and to the active-worker tracker.

use tokio::sync::broadcast;

use super::event::Event;

/// Broadcast channel for runtime events.
///
/// Wrapper over [`tokio::sync::broadcast`] that provides `publish`/`subscribe`
/// methods for broadcasting [`Event`]s to multiple concurrent subscribers.
#[derive(Clone)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a new bus with the given channel capacity.
    ///
    /// When capacity is exceeded, the oldest unsent events are dropped.
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publishes an event to all active subscribers.
    ///
    /// If there are no active subscribers, the event is dropped silently;
    /// the relay operates the same with or without observers.
    pub fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// Creates a new subscriber that will receive all future events.
    ///
    /// Each call creates an independent receiver; every receiver gets a clone
    /// of every event published after the subscription.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}
