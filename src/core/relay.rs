//! # Relay: polling dispatcher and lifecycle host.
//!
//! The [`Relay`] owns the runtime components (event bus, subscriber set,
//! active-worker tracker) and drives the polling loop from sleep to worker
//! fan-out to graceful termination.
//!
//! - Polls the store for outboxes with pending messages
//! - Gates every pass on transport health
//! - Spawns one [`DeliveryWorker`] per distinct outbox id, waits for all
//! - Fans out events to subscribers via `SubscriberSet`
//! - Performs graceful shutdown with a configurable grace period
//!
//! ## Architecture
//! ```text
//! Relay::run(token)
//!   loop {
//!     ├─► sleep(query_delay)            (cancellable)
//!     ├─► transport.wait_until_ready()  (cancellable)
//!     ├─► store.pending_outboxes(query_message_limit)
//!     │       └─ scan error → publish PassFaulted, next tick
//!     ├─► deduplicate ids
//!     └─► JoinSet: DeliveryWorker::run per id ── publish events to Bus
//!             └─► join all before the next tick
//!   }
//!
//! Relay::serve()
//!   ├─► run(token) in the background of a select
//!   └─► OS signal → publish ShutdownRequested → cancel token
//!         ├─► all workers settle within grace → AllStoppedWithin
//!         └─► grace exceeded → GraceExceeded { stuck outbox ids }
//! ```
//!
//! ## Rules
//! - A new pass never starts before the previous pass's workers settled.
//! - A faulted worker is reported and forgotten; its outbox is rediscovered
//!   on the next tick. Sibling workers are unaffected.
//! - The dispatcher itself never retries; the next tick is the retry.
//! - Worker tracking uses event **sequence numbers** (handles out-of-order
//!   delivery through the bus).

use std::collections::HashSet;
use std::sync::Arc;

use tokio::{
    sync::{broadcast, Semaphore},
    task::JoinSet,
    time::{sleep, timeout},
};
use tokio_util::sync::CancellationToken;

use crate::config::RelayConfig;
use crate::error::{RelayError, SendError};
use crate::events::{Bus, Event, EventKind};
use crate::outbox::OutboxId;
use crate::store::{Store, StoreRef};
use crate::subscribers::{Subscribe, SubscriberSet};
use crate::transport::{Transport, TransportRef};

use super::active::ActiveTracker;
use super::shutdown;
use super::worker::DeliveryWorker;

/// Orchestrates polling passes, delivery workers, and graceful shutdown.
pub struct Relay {
    /// Runtime configuration.
    cfg: RelayConfig,
    /// The transactional store being drained.
    store: StoreRef,
    /// The message bus messages are relayed to.
    transport: TransportRef,
    /// Event bus shared with all workers.
    bus: Bus,
    /// Fan-out set for subscribers.
    subs: Arc<SubscriberSet>,
    /// Tracker of in-flight workers for stuck detection.
    active: Arc<ActiveTracker>,
}

impl Relay {
    /// Creates a new relay with the given adapters and subscribers.
    pub fn new(
        cfg: RelayConfig,
        store: StoreRef,
        transport: TransportRef,
        subscribers: Vec<Arc<dyn Subscribe>>,
    ) -> Self {
        let bus = Bus::new(cfg.bus_capacity);
        let subs = Arc::new(SubscriberSet::new(subscribers, bus.clone()));

        Self {
            cfg,
            store,
            transport,
            bus,
            subs,
            active: Arc::new(ActiveTracker::new()),
        }
    }

    /// Subscribes to the relay's event stream.
    ///
    /// Useful for tests and ad-hoc monitoring; long-lived consumers should
    /// implement [`Subscribe`] instead.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.bus.subscribe()
    }

    /// Returns the outboxes with a worker currently in flight.
    pub async fn active_outboxes(&self) -> Vec<OutboxId> {
        self.active.snapshot().await
    }

    /// True while a worker for `outbox` is in flight.
    pub async fn is_active(&self, outbox: OutboxId) -> bool {
        self.active.is_active(outbox).await
    }

    /// Runs polling passes until the token is canceled.
    ///
    /// ### Pass shape
    /// 1. Sleep `query_delay`.
    /// 2. Wait for the transport to report ready.
    /// 3. Scan for distinct outbox ids with pending messages.
    /// 4. Spawn one worker per id; wait for all of them.
    ///
    /// Worker faults and scan errors are published and absorbed; the loop
    /// only exits on cancellation.
    pub async fn run(&self, token: CancellationToken) {
        // Spawn the listener before any worker to avoid missing early events.
        self.subscriber_listener();
        let semaphore = self.build_semaphore();

        loop {
            tokio::select! {
                _ = sleep(self.cfg.query_delay) => {}
                _ = token.cancelled() => break,
            }

            match self.transport.wait_until_ready(&token).await {
                Ok(()) => {}
                Err(SendError::Canceled) => break,
                Err(err) => {
                    self.bus
                        .publish(Event::now(EventKind::PassFaulted).with_error(err.to_string()));
                    continue;
                }
            }
            if token.is_cancelled() {
                break;
            }

            let ids = match self
                .store
                .pending_outboxes(self.cfg.query_message_limit)
                .await
            {
                Ok(ids) => ids,
                Err(err) => {
                    self.bus
                        .publish(Event::now(EventKind::PassFaulted).with_error(err.to_string()));
                    continue;
                }
            };

            let mut seen = HashSet::new();
            let ids: Vec<OutboxId> = ids.into_iter().filter(|id| seen.insert(*id)).collect();
            if ids.is_empty() {
                continue;
            }

            let mut workers = JoinSet::new();
            for id in ids {
                let worker = DeliveryWorker {
                    store: Arc::clone(&self.store),
                    transport: Arc::clone(&self.transport),
                    cfg: self.cfg.clone(),
                    bus: self.bus.clone(),
                    semaphore: semaphore.clone(),
                };
                let child = token.child_token();
                workers.spawn(async move { worker.run(id, child).await });
            }

            while let Some(joined) = workers.join_next().await {
                if let Err(join_err) = joined {
                    self.bus.publish(
                        Event::now(EventKind::PassFaulted)
                            .with_error(format!("worker panicked: {join_err}")),
                    );
                }
            }
        }
    }

    /// Runs the relay until an OS termination signal arrives.
    ///
    /// ### Graceful shutdown flow
    /// - Receive OS signal
    /// - Publish `ShutdownRequested` and cancel the runtime token
    /// - Wait up to `RelayConfig::grace` for in-flight workers
    /// - Return `Ok(())` if everything settled, or
    ///   [`RelayError::GraceExceeded`] naming the stuck outboxes
    pub async fn serve(&self) -> Result<(), RelayError> {
        let token = CancellationToken::new();
        let runner = self.run(token.clone());
        tokio::pin!(runner);

        tokio::select! {
            _ = &mut runner => Ok(()),
            sig = shutdown::wait_for_shutdown_signal() => {
                if let Err(err) = sig {
                    token.cancel();
                    return Err(RelayError::Signal(err));
                }
                self.bus.publish(Event::now(EventKind::ShutdownRequested));
                token.cancel();
                self.wait_with_grace(&mut runner).await
            }
        }
    }

    /// Waits for the canceled dispatcher with the grace period timeout.
    ///
    /// Publishes the terminal event (`AllStoppedWithin` or `GraceExceeded`).
    async fn wait_with_grace(
        &self,
        runner: &mut (impl std::future::Future<Output = ()> + Unpin),
    ) -> Result<(), RelayError> {
        let grace = self.cfg.grace;
        match timeout(grace, runner).await {
            Ok(()) => {
                self.bus.publish(Event::now(EventKind::AllStoppedWithin));
                Ok(())
            }
            Err(_elapsed) => {
                self.bus.publish(Event::now(EventKind::GraceExceeded));
                let stuck = self.active.snapshot().await;
                Err(RelayError::GraceExceeded { grace, stuck })
            }
        }
    }

    /// Spawns the background task that:
    /// 1. Subscribes to the event bus
    /// 2. Updates the active-worker tracker (sequence-based ordering)
    /// 3. Fans out events to subscribers
    fn subscriber_listener(&self) {
        let mut rx = self.bus.subscribe();
        let set = Arc::clone(&self.subs);
        let active = Arc::clone(&self.active);

        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(ev) => {
                        let arc_ev = Arc::new(ev);
                        active.update(&arc_ev).await;
                        set.emit_arc(arc_ev);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                }
            }
        });
    }

    /// Builds the global semaphore for worker concurrency limiting.
    ///
    /// Returns `None` if `max_concurrent == 0` (unlimited).
    fn build_semaphore(&self) -> Option<Arc<Semaphore>> {
        match self.cfg.max_concurrent {
            0 => None,
            n => Some(Arc::new(Semaphore::new(n))),
        }
    }
}
