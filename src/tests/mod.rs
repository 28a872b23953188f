//! Integration tests for the relay.
//!
//! Test organization:
//!
//! - `harness.rs`     - mock transport, chaos store, and the `Rig` bundle
//! - `delivery.rs`    - baseline delivery: single message, batch limits,
//!                      quiescence
//! - `ordering.rs`    - per-outbox ordering and skip semantics
//! - `faults.rs`      - rejected sends, deadlines, health gating, chaos
//!                      commits and rollbacks
//! - `concurrency.rs` - parallel outboxes, competing instances, lock
//!                      strategies
//! - `cleanup.rs`     - two-phase delivered marker and state invariants

mod cleanup;
mod concurrency;
mod delivery;
pub(crate) mod harness;
