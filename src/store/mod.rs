//! # Store adapter: the transactional persistence side of the relay.
//!
//! The relay is polymorphic over its store. One [`Store`] implementation
//! binds to exactly one concurrency-control strategy:
//!
//! - **Row-lock strategy** (relational stores): the state row is locked with
//!   a native pessimistic-lock query, produced by a [`LockStatementProvider`].
//!   Contending sessions block inside the store; attempts are idempotent up
//!   to the first send and may be auto-retried
//!   ([`Store::retries_attempts`] returns `true`).
//! - **Lock-token strategy** (document stores): acquisition is an atomic
//!   compare-and-set of [`LockToken`](crate::outbox::LockToken); a losing CAS
//!   surfaces [`StoreError::LockBusy`] and the worker decides whether to
//!   retry.
//!
//! ## Session lifecycle
//! ```text
//! Store::begin(opts, ctx) ──► StoreSession (one transaction)
//!        │                        │
//!        │                  lock_state ── insert_state / replace_state
//!        │                        │       pending_messages / delete_message
//!        │                        │       purge_outbox
//!        │                        ▼
//!        └──────────────── commit | abort   (consumes the session)
//! ```
//!
//! ## Rules
//! - One session = one transaction = at most one locked state row.
//! - `replace_state` applies only where `stored.version < new.version`; a
//!   rejected guard is a [`StoreError::Conflict`].
//! - `pending_messages` returns rows with `sequence_number > after`, ordered
//!   ascending, at most `limit` of them.
//! - Every exit path (commit, abort, drop) releases the lock and the session.

mod memory;

#[cfg(feature = "postgres")]
mod postgres;

pub use memory::{LockStrategy, MemoryStore};

#[cfg(feature = "postgres")]
pub use postgres::PostgresStore;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::StoreError;
use crate::outbox::{MessageId, OutboxId, OutboxMessage, OutboxState};

/// Shared handle to a store object.
pub type StoreRef = Arc<dyn Store>;

/// Transaction isolation level for stores that honor one.
///
/// Lock-token stores may ignore this; their exclusion comes from the token
/// CAS, not from the transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IsolationLevel {
    /// Reads see only committed data; ranges may move between reads.
    ReadCommitted,
    /// Reads are repeatable within the transaction.
    RepeatableRead,
    /// Full serializability.
    Serializable,
}

impl IsolationLevel {
    /// SQL spelling of the level, for stores that set it with a statement.
    pub fn as_sql(&self) -> &'static str {
        match self {
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        }
    }
}

/// Options for one transaction.
#[derive(Clone, Copy, Debug)]
pub struct TxOptions {
    /// Requested isolation level.
    pub isolation: IsolationLevel,
    /// Deadline for the whole transaction, composed with cancellation.
    pub timeout: Duration,
}

/// Produces the native pessimistic-lock query for row-lock stores.
///
/// Relational stores differ in how a single-row exclusive lock is spelled;
/// the provider isolates that dialect detail from the store implementation.
pub trait LockStatementProvider: Send + Sync {
    /// Returns a statement locking the state row of one outbox.
    ///
    /// The statement must take the outbox id as its only bind parameter and
    /// return the row's columns.
    fn row_lock_statement(&self, table: &str) -> String;
}

/// Standard `FOR UPDATE` lock statement.
#[derive(Clone, Copy, Debug, Default)]
pub struct PostgresLockStatementProvider;

impl LockStatementProvider for PostgresLockStatementProvider {
    fn row_lock_statement(&self, table: &str) -> String {
        format!(
            "SELECT outbox_id, last_sequence_number, delivered_at, version, lock_token \
             FROM {table} WHERE outbox_id = $1 FOR UPDATE"
        )
    }
}

/// One transaction against the outbox tables.
///
/// Obtained from [`Store::begin`]; consumed by `commit` or `abort`. Writes
/// may be buffered until commit as long as commit applies them atomically.
#[async_trait]
pub trait StoreSession: Send {
    /// Acquires the exclusive lock for `outbox` and loads its state row.
    ///
    /// Returns `Ok(None)` when no state row exists yet (the lock is still
    /// held, covering the subsequent insert). Lock-token stores surface a
    /// losing CAS as [`StoreError::LockBusy`].
    async fn lock_state(&mut self, outbox: OutboxId) -> Result<Option<OutboxState>, StoreError>;

    /// Inserts a fresh state row.
    ///
    /// Lock-token stores stamp their current token into the row.
    async fn insert_state(&mut self, state: &OutboxState) -> Result<(), StoreError>;

    /// Replaces the state row, guarded by `stored.version < state.version`.
    async fn replace_state(&mut self, state: &OutboxState) -> Result<(), StoreError>;

    /// Reads up to `limit` messages of `outbox` with
    /// `sequence_number > after`, ascending.
    async fn pending_messages(
        &mut self,
        outbox: OutboxId,
        after: u64,
        limit: usize,
    ) -> Result<Vec<OutboxMessage>, StoreError>;

    /// Deletes one message row by id.
    async fn delete_message(&mut self, message: MessageId) -> Result<(), StoreError>;

    /// Deletes every message of `outbox` and its state row.
    ///
    /// Returns the number of message rows removed.
    async fn purge_outbox(&mut self, outbox: OutboxId) -> Result<u64, StoreError>;

    /// Commits the transaction, applying buffered writes atomically.
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    /// Aborts the transaction, discarding buffered writes.
    async fn abort(self: Box<Self>) -> Result<(), StoreError>;
}

/// Factory for sessions plus the non-transactional discovery scan.
#[async_trait]
pub trait Store: Send + Sync + 'static {
    /// Scans up to `limit` grouped message rows and returns their outbox ids.
    ///
    /// Rows without a group are skipped. The result may contain duplicates;
    /// the dispatcher deduplicates.
    async fn pending_outboxes(&self, limit: usize) -> Result<Vec<OutboxId>, StoreError>;

    /// Opens one transaction.
    async fn begin(
        &self,
        opts: TxOptions,
        ctx: &CancellationToken,
    ) -> Result<Box<dyn StoreSession>, StoreError>;

    /// Whether faulted attempts should be re-run by the worker.
    ///
    /// Row-lock stores return `true` and accept that a commit fault after a
    /// successful send re-delivers that message. Lock-token stores return
    /// `false`; retry is left to the next polling pass.
    fn retries_attempts(&self) -> bool {
        false
    }
}
