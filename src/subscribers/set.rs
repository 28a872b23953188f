//! # SubscriberSet: non-blocking fan-out over multiple subscribers.
//!
//! [`SubscriberSet`] distributes each [`Event`] to multiple subscribers
//! **without awaiting** their processing.
//!
//! ## What it guarantees
//! - `emit_arc(event)` returns immediately.
//! - Per-subscriber FIFO (queue order).
//! - Panics inside subscribers are caught and reported (isolation).
//!
//! ## What it does **not** guarantee
//! - No global ordering across different subscribers.
//! - No retries on per-subscriber queue overflow (the event is dropped for
//!   that subscriber and a `SubscriberOverflow` event is published).
//!
//! ## Diagram
//! ```text
//!    emit_arc(Event)
//!        │                        (Arc-clone per subscriber)
//!        ├────────────────► [queue S1] ─► worker S1 ─► on_event()
//!        ├────────────────► [queue S2] ─► worker S2 ─► on_event()
//!        └────────────────► [queue SN] ─► worker SN ─► on_event()
//! ```

use std::sync::Arc;

use futures::FutureExt;
use tokio::{sync::mpsc, task::JoinHandle};

use crate::events::{Bus, Event, EventKind};

use super::Subscribe;

/// Per-subscriber channel with metadata.
struct SubscriberChannel {
    name: &'static str,
    sender: mpsc::Sender<Arc<Event>>,
}

/// Composite fan-out with per-subscriber bounded queues and worker tasks.
pub struct SubscriberSet {
    channels: Vec<SubscriberChannel>,
    workers: Vec<JoinHandle<()>>,
    bus: Bus,
}

impl SubscriberSet {
    /// Creates a new set and spawns one worker per subscriber.
    ///
    /// Overflow and panic notices are published back on `bus` so that other
    /// subscribers can observe them.
    #[must_use]
    pub fn new(subs: Vec<Arc<dyn Subscribe>>, bus: Bus) -> Self {
        let mut channels = Vec::with_capacity(subs.len());
        let mut workers = Vec::with_capacity(subs.len());

        for sub in subs {
            let cap = sub.queue_capacity().max(1);
            let name = sub.name();
            let (tx, mut rx) = mpsc::channel::<Arc<Event>>(cap);
            let s = Arc::clone(&sub);
            let worker_bus = bus.clone();

            let handle = tokio::spawn(async move {
                while let Some(ev) = rx.recv().await {
                    let fut = s.on_event(ev.as_ref());
                    if let Err(panic_err) = std::panic::AssertUnwindSafe(fut).catch_unwind().await
                    {
                        worker_bus
                            .publish(Event::subscriber_panicked(s.name(), format!("{panic_err:?}")));
                    }
                }
            });

            channels.push(SubscriberChannel { name, sender: tx });
            workers.push(handle);
        }

        Self {
            channels,
            workers,
            bus,
        }
    }

    /// Fan-out one already-shared event to all subscribers (non-blocking).
    ///
    /// If a subscriber's queue is **full** or **closed**, the event is dropped
    /// for it and a `SubscriberOverflow` event is published. Overflow and
    /// panic notices are never re-reported when they themselves overflow,
    /// which keeps a saturated queue from feeding itself.
    pub fn emit_arc(&self, ev: Arc<Event>) {
        for channel in &self.channels {
            match channel.sender.try_send(Arc::clone(&ev)) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    self.notice(&ev, channel.name, "queue_full");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    self.notice(&ev, channel.name, "worker_closed");
                }
            }
        }
    }

    fn notice(&self, dropped: &Event, subscriber: &'static str, reason: &'static str) {
        if matches!(
            dropped.kind,
            EventKind::SubscriberOverflow | EventKind::SubscriberPanicked
        ) {
            return;
        }
        self.bus.publish(Event::subscriber_overflow(subscriber, reason));
    }

    /// Graceful shutdown: close all queues and await worker completion.
    pub async fn shutdown(self) {
        drop(self.channels);
        for h in self.workers {
            let _ = h.await;
        }
    }

    /// True if there are no subscribers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Number of subscribers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.channels.len()
    }
}
