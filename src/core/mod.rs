//! Runtime core: the delivery loop and its lifecycle.
//!
//! This module contains the embedded implementation of the relay runtime.
//! The only public API re-exported from here is [`Relay`]. Everything else
//! is an internal building block that the relay wires together.
//!
//! ## Files & responsibilities
//! - **relay.rs**: public facade; owns the runtime (Bus, SubscriberSet,
//!   ActiveTracker), drives the polling loop and graceful shutdown.
//! - **worker.rs**: per-outbox attempt loop; applies the lock-retry policy,
//!   publishes WorkerStarting/LockRetryScheduled and terminal
//!   WorkerStopped/WorkerFaulted.
//! - **attempt.rs**: ONE store transaction: lock the state row, branch on
//!   absent/delivered/pending, cleanup, guarded state replace, best-effort
//!   abort with RollbackFaulted reporting.
//! - **pass.rs**: the ordered send loop: skip-missing-destination,
//!   break-on-fault, cursor advance, drained decision.
//! - **active.rs**: sequence-aware in-flight worker tracker (stuck
//!   detection during shutdown).
//! - **shutdown.rs**: cross-platform OS signal handling used by `serve()`.
//!
//! ## Event data-plane (who publishes & who consumes)
//!
//! Producers (publish to Bus):
//! - **Relay**          → `ShutdownRequested`, `AllStoppedWithin`,
//!                        `GraceExceeded`, `PassFaulted`
//! - **DeliveryWorker** → `WorkerStarting`, `LockRetryScheduled`,
//!                        `WorkerStopped`, `WorkerFaulted`
//! - **attempt/pass**   → `MessageSent`, `SendFaulted`, `DestinationMissing`,
//!                        `OutboxDelivered`, `OutboxRemoved`, `RollbackFaulted`
//! - **SubscriberSet**  → `SubscriberOverflow`, `SubscriberPanicked`
//!
//! Consumers (subscribe to Bus):
//! - **Relay::subscriber_listener()** (single fan-out point)
//!     - updates **ActiveTracker** (sequence-based ordering)
//!     - emits to **SubscriberSet** (per-subscriber mpsc queues)
//!
//! ## Wiring (module-level flow)
//! ```text
//! Application code
//!   └─ wires Store + Transport, creates Relay, calls run(token) or serve()
//!
//! Relay::run(token)
//!   ├─ spawn subscriber_listener()
//!   └─ loop: sleep → health gate → scan ids → dedupe
//!        └─ JoinSet: one DeliveryWorker per id (child tokens)
//!
//! DeliveryWorker::run(outbox)  (per id, sequential attempts)
//! loop {
//!   run_attempt():
//!     begin tx ─ lock state row
//!       ├─ absent    → insert fresh state            → Continue
//!       ├─ delivered → purge rows + state            → Done
//!       └─ pending   → deliver_batch():
//!                        send in sequence order,
//!                        delete each acked row,
//!                        advance cursor, maybe mark delivered
//!                      version++ → guarded replace   → Continue/Done
//!     commit | abort(best-effort)
//!   on contention: backoff (bounded) and re-attempt
//! }
//! ```
//!
//! ## Shutdown timeline
//! ```text
//! OS signal → Relay publishes ShutdownRequested → cancel runtime token
//! → sleep/health/store/send awaits unwind → workers abort their transaction
//! → wait_with_grace(): AllStoppedWithin OR GraceExceeded{grace, stuck ids}
//! ```
//!
//! ## Notes
//! - Event ordering is maintained via a global monotonic sequence number.
//! - Event delivery is fire-and-forget (bounded broadcast + per-subscriber
//!   mpsc).
//! - A pass never overlaps the previous one; per-outbox order is enforced by
//!   the store-side lock, not by in-process coordination.

mod active;
mod attempt;
mod pass;
mod relay;
mod shutdown;
mod worker;

pub use relay::Relay;

#[cfg(test)]
pub(crate) use attempt::{run_attempt, Attempt};
#[cfg(test)]
pub(crate) use worker::{DeliveryWorker, WorkerExit};
