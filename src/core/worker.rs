//! # DeliveryWorker: per-outbox attempt loop.
//!
//! Supervises delivery for one outbox id within one polling pass: runs
//! transactional attempts back to back until the outbox reports `Done`, a
//! fault propagates, or the runtime is canceled.
//!
//! ## Flow
//! ```text
//! loop {
//!   ├─► check cancellation (fast-path)
//!   ├─► attempt += 1, publish WorkerStarting
//!   ├─► run_attempt()
//!   │     ├─ Continue            → next attempt
//!   │     ├─ Done                → publish WorkerStopped, exit Completed
//!   │     ├─ Err(Canceled)       → publish WorkerStopped, exit Canceled
//!   │     ├─ Err(contention) and retries left
//!   │     │                      → publish LockRetryScheduled, backoff sleep
//!   │     └─ Err(other)          → publish WorkerFaulted, exit Faulted
//! }
//! ```
//!
//! ## Rules
//! - Attempts run **sequentially** within one worker (never parallel).
//! - Lock contention (`LockBusy`, optimistic `Conflict`) is retried with
//!   backoff, at most `lock_retry_limit` times per streak; nothing has been
//!   sent when contention surfaces, so the retry repeats no side effect.
//! - Stores that declare `retries_attempts()` additionally get their other
//!   transient faults re-run under the same bound.
//! - An exhausted retry budget faults the worker; the outbox is retried on a
//!   later polling pass.

use std::sync::Arc;
use std::time::Duration;

use tokio::{select, sync::Semaphore, time};
use tokio_util::sync::CancellationToken;

use crate::config::RelayConfig;
use crate::error::StoreError;
use crate::events::{Bus, Event, EventKind};
use crate::outbox::OutboxId;
use crate::store::{Store, StoreRef};
use crate::transport::TransportRef;

use super::attempt::{run_attempt, Attempt};

/// Reason why a delivery worker exited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WorkerExit {
    /// The outbox finished for this pass (drained, cleaned up, or deferred).
    Completed,
    /// The runtime was canceled mid-flight.
    Canceled,
    /// A store fault exhausted the retry budget.
    Faulted,
}

/// Drives delivery attempts for one outbox id.
pub(crate) struct DeliveryWorker {
    /// Store shared with every worker.
    pub store: StoreRef,
    /// Transport shared with every worker.
    pub transport: TransportRef,
    /// Runtime configuration.
    pub cfg: RelayConfig,
    /// Event bus for lifecycle and delivery events.
    pub bus: Bus,
    /// Optional global concurrency limiter.
    pub semaphore: Option<Arc<Semaphore>>,
}

impl DeliveryWorker {
    /// Runs the attempt loop until completion, fault, or cancellation.
    pub async fn run(self, outbox: OutboxId, token: CancellationToken) -> WorkerExit {
        let _permit = match &self.semaphore {
            Some(sem) => {
                let acquire = sem.clone().acquire_owned();
                tokio::pin!(acquire);
                select! {
                    res = &mut acquire => match res {
                        Ok(permit) => Some(permit),
                        Err(_closed) => return WorkerExit::Canceled,
                    },
                    _ = token.cancelled() => return WorkerExit::Canceled,
                }
            }
            None => None,
        };

        let mut attempt: u64 = 0;
        let mut retries: u32 = 0;
        let mut prev_delay: Option<Duration> = None;

        loop {
            if token.is_cancelled() {
                return self.stop(outbox, WorkerExit::Canceled);
            }

            attempt += 1;
            self.bus.publish(
                Event::now(EventKind::WorkerStarting)
                    .with_outbox(outbox)
                    .with_attempt(attempt),
            );

            let res = run_attempt(
                &self.store,
                &self.transport,
                outbox,
                &self.cfg,
                &self.bus,
                &token,
            )
            .await;

            match res {
                Ok(Attempt::Continue) => {
                    retries = 0;
                    prev_delay = None;
                }
                Ok(Attempt::Done) => {
                    return self.stop(outbox, WorkerExit::Completed);
                }
                Err(StoreError::Canceled) => {
                    return self.stop(outbox, WorkerExit::Canceled);
                }
                Err(err) => {
                    let eligible = err.is_contention() || self.store.retries_attempts();
                    if !(eligible && err.is_retryable() && retries < self.cfg.lock_retry_limit) {
                        self.bus.publish(
                            Event::now(EventKind::WorkerFaulted)
                                .with_outbox(outbox)
                                .with_attempt(attempt)
                                .with_error(err.to_string()),
                        );
                        return WorkerExit::Faulted;
                    }

                    retries += 1;
                    let delay = self.cfg.lock_backoff.next(prev_delay);
                    prev_delay = Some(delay);
                    self.bus.publish(
                        Event::now(EventKind::LockRetryScheduled)
                            .with_outbox(outbox)
                            .with_attempt(attempt)
                            .with_delay(delay)
                            .with_error(err.to_string()),
                    );

                    let sleep = time::sleep(delay);
                    tokio::pin!(sleep);
                    select! {
                        _ = &mut sleep => {}
                        _ = token.cancelled() => {
                            return self.stop(outbox, WorkerExit::Canceled);
                        }
                    }
                }
            }
        }
    }

    /// Publishes the terminal `WorkerStopped` event and returns `exit`.
    fn stop(&self, outbox: OutboxId, exit: WorkerExit) -> WorkerExit {
        self.bus
            .publish(Event::now(EventKind::WorkerStopped).with_outbox(outbox));
        exit
    }
}
