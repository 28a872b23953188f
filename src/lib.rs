//! # outboxvisor
//!
//! **Outboxvisor** is a transactional-outbox delivery relay.
//!
//! It drains messages that application transactions wrote to a durable
//! outbox and publishes them to a message bus, preserving per-outbox
//! ordering, exactly-once-from-outbox semantics, and crash-safety under
//! concurrent relay instances. The crate is designed as a building block:
//! the producer side, the broker client, and the storage driver stay outside,
//! behind the [`Store`] and [`Transport`] seams.
//!
//! ## Features
//!
//! | Area            | Description                                                            | Key types / traits                     |
//! |-----------------|------------------------------------------------------------------------|----------------------------------------|
//! | **Relay**       | Polling dispatcher, per-outbox workers, graceful shutdown.             | [`Relay`], [`RelayConfig`]             |
//! | **Stores**      | Transactional persistence with row-lock or lock-token exclusion.       | [`Store`], [`StoreSession`], [`MemoryStore`] |
//! | **Transport**   | Health-gated, acknowledged sends to the message bus.                   | [`Transport`], [`SendEndpoint`], [`Envelope`] |
//! | **Events**      | Structured runtime events over a broadcast bus.                        | [`Event`], [`EventKind`], [`Bus`]      |
//! | **Subscribers** | Hook into delivery events (logging, metrics, custom observers).        | [`Subscribe`], [`SubscriberSet`]       |
//! | **Policies**    | Backoff/jitter shaping for contended-lock retries.                     | [`BackoffPolicy`], [`JitterPolicy`]    |
//! | **Errors**      | Typed faults for store, transport, and host.                           | [`StoreError`], [`SendError`], [`RelayError`] |
//!
//! ## Optional features
//! - `logging` *(default)*: exports a simple built-in [`LogWriter`] subscriber.
//! - `postgres`: exports the sqlx-backed row-lock store.
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//! use outboxvisor::{
//!     LockStrategy, LogWriter, MemoryStore, MessageBody, OutboxId, OutboxMessage,
//!     Relay, RelayConfig, Subscribe,
//! };
//! # use outboxvisor::{Envelope, SendEndpoint, SendError, Transport};
//! # use async_trait::async_trait;
//! # struct NullTransport;
//! # #[async_trait]
//! # impl Transport for NullTransport {
//! #     async fn wait_until_ready(&self, _ctx: &CancellationToken) -> Result<(), SendError> { Ok(()) }
//! #     async fn endpoint(&self, _address: &str) -> Result<Arc<dyn SendEndpoint>, SendError> {
//! #         Err(SendError::Rejected { reason: "demo".into() })
//! #     }
//! # }
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut cfg = RelayConfig::default();
//!     cfg.query_delay = Duration::from_millis(100);
//!
//!     // Producer side: rows land in the store inside the app's transaction.
//!     let store = Arc::new(MemoryStore::new(LockStrategy::LeaseToken));
//!     let outbox = OutboxId::generate();
//!     store.enqueue(OutboxMessage::new(
//!         outbox,
//!         1,
//!         "queue:orders",
//!         MessageBody::new(br#"{"order":1}"#.to_vec()),
//!     ));
//!
//!     // Relay side: drain the outbox to the transport.
//!     let transport = Arc::new(NullTransport);
//!     let subscribers: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter)];
//!     let relay = Relay::new(cfg, store, transport, subscribers);
//!
//!     let token = CancellationToken::new();
//!     tokio::select! {
//!         _ = relay.run(token.clone()) => {}
//!         _ = tokio::time::sleep(Duration::from_secs(1)) => token.cancel(),
//!     }
//! }
//! ```
//!
//! ---

mod config;
mod error;
mod events;
mod outbox;
mod policies;
mod store;
mod subscribers;
mod transport;

mod core;

#[cfg(test)]
mod tests;

// ---- Public re-exports ----

pub use crate::core::Relay;
pub use config::RelayConfig;
pub use error::{RelayError, SendError, StoreError};
pub use events::{Bus, Event, EventKind};
pub use outbox::{LockToken, MessageBody, MessageId, OutboxId, OutboxMessage, OutboxState};
pub use policies::{BackoffPolicy, JitterPolicy};
pub use store::{
    IsolationLevel, LockStatementProvider, LockStrategy, MemoryStore,
    PostgresLockStatementProvider, Store, StoreRef, StoreSession, TxOptions,
};
pub use subscribers::{Subscribe, SubscriberSet};
pub use transport::{Envelope, SendEndpoint, Transport, TransportRef};

// Optional: expose the sqlx-backed row-lock store.
// Enable with: `--features postgres`
#[cfg(feature = "postgres")]
pub use store::PostgresStore;

// Optional: expose a simple built-in logging subscriber (demo/reference).
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
