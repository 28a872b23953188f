//! # Active-worker tracker with sequence-based ordering.
//!
//! Maintains the authoritative set of outboxes that currently have a worker
//! in flight, using event sequence numbers to handle out-of-order delivery
//! through async channels.
//!
//! ## Rules
//! - **Active = true** on `WorkerStarting`.
//! - **Active = false** on `WorkerStopped` and `WorkerFaulted`.
//! - Events with `seq <= last_seq` for the outbox are rejected (stale).
//! - Reads (`snapshot`, `is_active`) are eventually consistent.
//!
//! Used by the relay during graceful shutdown to report outboxes whose
//! workers did not settle within the grace period.

use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::events::{Event, EventKind};
use crate::outbox::OutboxId;

/// Per-outbox state for ordering validation.
#[derive(Debug, Clone)]
struct WorkerState {
    /// Last seen event sequence number for this outbox.
    last_seq: u64,
    /// Whether a worker is currently in flight.
    active: bool,
}

/// Thread-safe tracker of in-flight workers.
pub(crate) struct ActiveTracker {
    state: RwLock<HashMap<OutboxId, WorkerState>>,
}

impl ActiveTracker {
    /// Creates a new empty tracker.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(HashMap::new()),
        }
    }

    /// Updates worker state if the event is newer than the last seen.
    ///
    /// Events are applied only if `ev.seq > last_seq` for the outbox, which
    /// keeps a late `WorkerStarting` from resurrecting a settled worker.
    pub async fn update(&self, ev: &Event) {
        let outbox = match ev.outbox {
            Some(id) => id,
            None => return,
        };

        let mut map = self.state.write().await;
        let entry = map.entry(outbox).or_insert(WorkerState {
            last_seq: 0,
            active: false,
        });
        if ev.seq <= entry.last_seq {
            return;
        }

        let next_active = match ev.kind {
            EventKind::WorkerStarting => true,
            EventKind::WorkerStopped | EventKind::WorkerFaulted => false,
            _ => entry.active,
        };

        entry.active = next_active;
        entry.last_seq = ev.seq;
    }

    /// Returns a sorted list of outboxes with a worker currently in flight.
    pub async fn snapshot(&self) -> Vec<OutboxId> {
        let state = self.state.read().await;
        let mut active: Vec<OutboxId> = state
            .iter()
            .filter(|(_, ws)| ws.active)
            .map(|(outbox, _)| *outbox)
            .collect();
        active.sort();
        active
    }

    /// True while a worker for `outbox` is in flight.
    pub async fn is_active(&self, outbox: OutboxId) -> bool {
        let state = self.state.read().await;
        state.get(&outbox).map(|ws| ws.active).unwrap_or(false)
    }
}
