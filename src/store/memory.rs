//! # In-memory store with real transactional semantics.
//!
//! [`MemoryStore`] keeps the outbox tables behind a shared mutex and models
//! one [`StoreSession`] as a buffer of writes applied atomically on commit.
//! It implements **both** concurrency-control strategies, selected at
//! construction:
//!
//! - [`LockStrategy::RowLock`]: one async mutex per outbox; a contending
//!   session blocks until the holder commits or aborts, bounded by the
//!   transaction deadline. Mirrors `SELECT … FOR UPDATE`.
//! - [`LockStrategy::LeaseToken`]: a token compare-and-set; a contending
//!   session fails fast with [`StoreError::LockBusy`] and the worker's retry
//!   policy takes over. Mirrors document stores without row locks.
//!
//! ## Rules
//! - Reads observe committed data only; buffered writes of the same session
//!   are not read back (the delivery flow reads before it writes).
//! - `replace_state` guards are validated at commit; a stale version fails
//!   the whole commit with [`StoreError::Conflict`] and applies nothing.
//! - The deadline from [`TxOptions`] bounds every session operation,
//!   including the time spent blocked on a row lock.
//! - The lock (either kind) is released on commit, abort, and drop.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tokio::time::{timeout_at, Instant};
use tokio_util::sync::CancellationToken;

use crate::error::StoreError;
use crate::outbox::{LockToken, MessageId, OutboxId, OutboxMessage, OutboxState};

use super::{Store, StoreSession, TxOptions};

/// Concurrency-control strategy for a [`MemoryStore`] instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LockStrategy {
    /// Native-style per-row lock: contenders block until the holder is done.
    RowLock,
    /// Token compare-and-set: contenders fail fast with `LockBusy`.
    LeaseToken,
}

/// The shared tables.
#[derive(Default)]
struct Tables {
    messages: Vec<OutboxMessage>,
    states: HashMap<OutboxId, OutboxState>,
}

/// Buffered write applied at commit.
enum Op {
    InsertState(OutboxState),
    ReplaceState(OutboxState),
    DeleteMessage(MessageId),
    PurgeOutbox(OutboxId),
}

/// In-memory store usable as an embedded backend and as the test substrate.
pub struct MemoryStore {
    strategy: LockStrategy,
    tables: Arc<StdMutex<Tables>>,
    row_locks: Arc<StdMutex<HashMap<OutboxId, Arc<AsyncMutex<()>>>>>,
    leases: Arc<StdMutex<HashMap<OutboxId, LockToken>>>,
}

impl MemoryStore {
    /// Creates an empty store bound to the given lock strategy.
    pub fn new(strategy: LockStrategy) -> Self {
        Self {
            strategy,
            tables: Arc::new(StdMutex::new(Tables::default())),
            row_locks: Arc::new(StdMutex::new(HashMap::new())),
            leases: Arc::new(StdMutex::new(HashMap::new())),
        }
    }

    /// Inserts a message row, as the producer's transaction would.
    pub fn enqueue(&self, message: OutboxMessage) {
        self.tables.lock().unwrap().messages.push(message);
    }

    /// Inserts a batch of message rows.
    pub fn enqueue_batch(&self, messages: impl IntoIterator<Item = OutboxMessage>) {
        self.tables.lock().unwrap().messages.extend(messages);
    }

    /// Number of message rows currently stored for `outbox`.
    pub fn message_count(&self, outbox: OutboxId) -> usize {
        self.tables
            .lock()
            .unwrap()
            .messages
            .iter()
            .filter(|m| m.outbox_id == Some(outbox))
            .count()
    }

    /// Number of message rows across all outboxes.
    pub fn total_messages(&self) -> usize {
        self.tables.lock().unwrap().messages.len()
    }

    /// Sequence numbers of the rows currently stored for `outbox`, ascending.
    pub fn pending_sequences(&self, outbox: OutboxId) -> Vec<u64> {
        let tables = self.tables.lock().unwrap();
        let mut seqs: Vec<u64> = tables
            .messages
            .iter()
            .filter(|m| m.outbox_id == Some(outbox))
            .map(|m| m.sequence_number)
            .collect();
        seqs.sort_unstable();
        seqs
    }

    /// Snapshot of the state row for `outbox`, if any.
    pub fn state(&self, outbox: OutboxId) -> Option<OutboxState> {
        self.tables.lock().unwrap().states.get(&outbox).cloned()
    }

    /// True when neither messages nor a state row remain for `outbox`.
    pub fn is_drained(&self, outbox: OutboxId) -> bool {
        let tables = self.tables.lock().unwrap();
        !tables.states.contains_key(&outbox)
            && !tables.messages.iter().any(|m| m.outbox_id == Some(outbox))
    }

}

#[async_trait]
impl Store for MemoryStore {
    async fn pending_outboxes(&self, limit: usize) -> Result<Vec<OutboxId>, StoreError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .messages
            .iter()
            .filter_map(|m| m.outbox_id)
            .take(limit)
            .collect())
    }

    async fn begin(
        &self,
        opts: TxOptions,
        ctx: &CancellationToken,
    ) -> Result<Box<dyn StoreSession>, StoreError> {
        if ctx.is_cancelled() {
            return Err(StoreError::Canceled);
        }
        Ok(Box::new(MemorySession {
            strategy: self.strategy,
            tables: Arc::clone(&self.tables),
            row_locks: Arc::clone(&self.row_locks),
            leases: Arc::clone(&self.leases),
            deadline: Instant::now() + opts.timeout,
            timeout: opts.timeout,
            ctx: ctx.clone(),
            held: None,
            ops: Vec::new(),
        }))
    }

    fn retries_attempts(&self) -> bool {
        self.strategy == LockStrategy::RowLock
    }
}

/// The lock a session currently holds.
enum Held {
    Row {
        outbox: OutboxId,
        _guard: OwnedMutexGuard<()>,
    },
    Lease(OutboxId, LockToken),
}

impl Held {
    fn outbox(&self) -> OutboxId {
        match self {
            Held::Row { outbox, .. } => *outbox,
            Held::Lease(outbox, _) => *outbox,
        }
    }
}

struct MemorySession {
    strategy: LockStrategy,
    tables: Arc<StdMutex<Tables>>,
    row_locks: Arc<StdMutex<HashMap<OutboxId, Arc<AsyncMutex<()>>>>>,
    leases: Arc<StdMutex<HashMap<OutboxId, LockToken>>>,
    deadline: Instant,
    timeout: std::time::Duration,
    ctx: CancellationToken,
    held: Option<Held>,
    ops: Vec<Op>,
}

impl MemorySession {
    fn check(&self) -> Result<(), StoreError> {
        if self.ctx.is_cancelled() {
            return Err(StoreError::Canceled);
        }
        if Instant::now() >= self.deadline {
            return Err(StoreError::Timeout {
                timeout: self.timeout,
            });
        }
        Ok(())
    }

    fn session_token(&self) -> Option<LockToken> {
        match &self.held {
            Some(Held::Lease(_, token)) => Some(*token),
            _ => None,
        }
    }

    fn release(&mut self) {
        if let Some(Held::Lease(outbox, token)) = self.held.take() {
            let mut leases = self.leases.lock().unwrap();
            if leases.get(&outbox) == Some(&token) {
                leases.remove(&outbox);
            }
        }
        // Held::Row releases by dropping the guard.
    }
}

#[async_trait]
impl StoreSession for MemorySession {
    async fn lock_state(&mut self, outbox: OutboxId) -> Result<Option<OutboxState>, StoreError> {
        self.check()?;
        if let Some(held) = &self.held {
            if held.outbox() != outbox {
                return Err(StoreError::backend("session already holds another row"));
            }
        } else {
            match self.strategy {
                LockStrategy::RowLock => {
                    let lock = {
                        let mut locks = self.row_locks.lock().unwrap();
                        Arc::clone(
                            locks
                                .entry(outbox)
                                .or_insert_with(|| Arc::new(AsyncMutex::new(()))),
                        )
                    };
                    let acquire = lock.lock_owned();
                    let guard = tokio::select! {
                        res = timeout_at(self.deadline, acquire) => {
                            res.map_err(|_| StoreError::Timeout { timeout: self.timeout })?
                        }
                        _ = self.ctx.cancelled() => return Err(StoreError::Canceled),
                    };
                    self.held = Some(Held::Row {
                        outbox,
                        _guard: guard,
                    });
                }
                LockStrategy::LeaseToken => {
                    let mut leases = self.leases.lock().unwrap();
                    if leases.contains_key(&outbox) {
                        return Err(StoreError::LockBusy);
                    }
                    let token = LockToken::generate();
                    leases.insert(outbox, token);
                    self.held = Some(Held::Lease(outbox, token));
                }
            }
        }

        let mut state = self.tables.lock().unwrap().states.get(&outbox).cloned();
        if let (Some(state), Some(token)) = (state.as_mut(), self.session_token()) {
            state.lock_token = Some(token);
        }
        Ok(state)
    }

    async fn insert_state(&mut self, state: &OutboxState) -> Result<(), StoreError> {
        self.check()?;
        let mut state = state.clone();
        if let Some(token) = self.session_token() {
            state.lock_token = Some(token);
        }
        self.ops.push(Op::InsertState(state));
        Ok(())
    }

    async fn replace_state(&mut self, state: &OutboxState) -> Result<(), StoreError> {
        self.check()?;
        let mut state = state.clone();
        if let Some(token) = self.session_token() {
            state.lock_token = Some(token);
        }
        self.ops.push(Op::ReplaceState(state));
        Ok(())
    }

    async fn pending_messages(
        &mut self,
        outbox: OutboxId,
        after: u64,
        limit: usize,
    ) -> Result<Vec<OutboxMessage>, StoreError> {
        self.check()?;
        let tables = self.tables.lock().unwrap();
        let mut rows: Vec<OutboxMessage> = tables
            .messages
            .iter()
            .filter(|m| m.outbox_id == Some(outbox) && m.sequence_number > after)
            .cloned()
            .collect();
        rows.sort_by_key(|m| m.sequence_number);
        rows.truncate(limit);
        Ok(rows)
    }

    async fn delete_message(&mut self, message: MessageId) -> Result<(), StoreError> {
        self.check()?;
        self.ops.push(Op::DeleteMessage(message));
        Ok(())
    }

    async fn purge_outbox(&mut self, outbox: OutboxId) -> Result<u64, StoreError> {
        self.check()?;
        let count = {
            let tables = self.tables.lock().unwrap();
            tables
                .messages
                .iter()
                .filter(|m| m.outbox_id == Some(outbox))
                .count() as u64
        };
        self.ops.push(Op::PurgeOutbox(outbox));
        Ok(count)
    }

    async fn commit(mut self: Box<Self>) -> Result<(), StoreError> {
        self.check().map_err(|e| {
            self.release();
            e
        })?;

        {
            let mut tables = self.tables.lock().unwrap();

            // Validate every guard before applying anything.
            let rejected = self.ops.iter().find_map(|op| match op {
                Op::ReplaceState(state) => match tables.states.get(&state.outbox_id) {
                    Some(stored) if stored.version < state.version => None,
                    _ => Some(state.version),
                },
                _ => None,
            });
            if let Some(version) = rejected {
                drop(tables);
                self.release();
                return Err(StoreError::Conflict { version });
            }

            for op in self.ops.drain(..) {
                match op {
                    Op::InsertState(state) | Op::ReplaceState(state) => {
                        tables.states.insert(state.outbox_id, state);
                    }
                    Op::DeleteMessage(message) => {
                        tables.messages.retain(|m| m.message_id != message);
                    }
                    Op::PurgeOutbox(outbox) => {
                        tables.messages.retain(|m| m.outbox_id != Some(outbox));
                        tables.states.remove(&outbox);
                    }
                }
            }
        }

        self.release();
        Ok(())
    }

    async fn abort(mut self: Box<Self>) -> Result<(), StoreError> {
        self.ops.clear();
        self.release();
        Ok(())
    }
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        self.release();
    }
}
