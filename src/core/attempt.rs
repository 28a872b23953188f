//! # One transactional delivery attempt.
//!
//! Executes a single attempt for one outbox: open a transaction, lock the
//! state row, branch on what was found, and commit (or abort best-effort on
//! any fault).
//!
//! ## Flow
//! ```text
//! begin(isolation, query_timeout)
//!   lock_state(outbox)
//!     ├─ absent            → insert fresh state (version 1)      → Continue
//!     ├─ delivered_at set  → purge messages + state, publish
//!     │                      OutboxRemoved                        → Done
//!     └─ pending           → deliver_batch (send loop)
//!                            version += 1, guarded replace
//!                            → Continue if the pass progressed,
//!                              Done otherwise
//! commit
//! ```
//!
//! ## Rules
//! - The attempt that sets `delivered_at` commits it and returns `Continue`;
//!   cleanup runs on the **next** attempt, so the marker is durable before
//!   any row is removed.
//! - On any store fault the transaction is aborted best-effort: a secondary
//!   abort failure is published as `RollbackFaulted` and suppressed so it
//!   never masks the primary fault.
//! - An attempt that neither sent, nor marked delivered, nor cleaned up
//!   returns `Done`; the outbox is picked up again on a later pass.

use tokio_util::sync::CancellationToken;

use crate::config::RelayConfig;
use crate::error::StoreError;
use crate::events::{Bus, Event, EventKind};
use crate::outbox::{OutboxId, OutboxState};
use crate::store::{Store, StoreRef, StoreSession, TxOptions};
use crate::transport::TransportRef;

use super::pass;

/// Whether the worker should run another attempt for this outbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Attempt {
    /// More work may remain; run another attempt.
    Continue,
    /// The outbox is finished for now (cleaned up or deferred).
    Done,
}

/// Runs one attempt for `outbox` inside a fresh store session.
pub(crate) async fn run_attempt(
    store: &StoreRef,
    transport: &TransportRef,
    outbox: OutboxId,
    cfg: &RelayConfig,
    bus: &Bus,
    ctx: &CancellationToken,
) -> Result<Attempt, StoreError> {
    let opts = TxOptions {
        isolation: cfg.isolation,
        timeout: cfg.query_timeout,
    };
    let mut session = store.begin(opts, ctx).await?;

    match drive(session.as_mut(), transport, outbox, cfg, bus, ctx).await {
        Ok(next) => {
            session.commit().await?;
            Ok(next)
        }
        Err(err) => {
            if let Err(rollback) = session.abort().await {
                bus.publish(
                    Event::now(EventKind::RollbackFaulted)
                        .with_outbox(outbox)
                        .with_error(rollback.to_string()),
                );
            }
            Err(err)
        }
    }
}

/// The in-transaction body of an attempt.
async fn drive(
    session: &mut dyn StoreSession,
    transport: &TransportRef,
    outbox: OutboxId,
    cfg: &RelayConfig,
    bus: &Bus,
    ctx: &CancellationToken,
) -> Result<Attempt, StoreError> {
    match session.lock_state(outbox).await? {
        None => {
            session.insert_state(&OutboxState::fresh(outbox)).await?;
            Ok(Attempt::Continue)
        }
        Some(state) if state.is_delivered() => {
            let removed = session.purge_outbox(outbox).await?;
            bus.publish(
                Event::now(EventKind::OutboxRemoved)
                    .with_outbox(outbox)
                    .with_count(removed),
            );
            Ok(Attempt::Done)
        }
        Some(mut state) => {
            let report = pass::deliver_batch(session, transport, &mut state, cfg, bus, ctx).await?;
            state.version += 1;
            session.replace_state(&state).await?;
            Ok(if report.progressed() {
                Attempt::Continue
            } else {
                Attempt::Done
            })
        }
    }
}
