//! # Event subscribers for the relay runtime.
//!
//! This module provides the [`Subscribe`] trait and the built-in machinery
//! for handling runtime events broadcast through the [`Bus`](crate::events::Bus).
//!
//! ## Architecture
//! ```text
//! Event flow:
//!   workers / dispatcher ── publish(Event) ──► Bus ──► Relay listener
//!                                                        │
//!                                                        ├──► ActiveTracker (internal)
//!                                                        │
//!                                                        └──► SubscriberSet::emit_arc
//!                                                               │
//!                                                          ┌────┴─────┬─────────┐
//!                                                          ▼          ▼         ▼
//!                                                       LogWriter  Metrics   Custom
//! ```
//!
//! ## Implementing custom subscribers
//! ```no_run
//! use outboxvisor::{Event, EventKind, Subscribe};
//! use async_trait::async_trait;
//!
//! struct FaultCounter;
//!
//! #[async_trait]
//! impl Subscribe for FaultCounter {
//!     async fn on_event(&self, event: &Event) {
//!         if event.kind == EventKind::SendFaulted {
//!             // increment a counter
//!         }
//!     }
//!
//!     fn name(&self) -> &'static str {
//!         "fault-counter"
//!     }
//! }
//! ```

mod set;
mod subscriber;

#[cfg(feature = "logging")]
mod log;

pub use set::SubscriberSet;
pub use subscriber::Subscribe;

#[cfg(feature = "logging")]
pub use log::LogWriter;
