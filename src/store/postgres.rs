//! # Postgres store: the row-lock strategy over sqlx.
//!
//! [`PostgresStore`] binds the relay to a relational schema and coordinates
//! concurrent relay instances with native pessimistic locks: the state row is
//! taken with the statement produced by the configured
//! [`LockStatementProvider`] (standard `FOR UPDATE` by default), so a
//! contending session blocks inside Postgres until the holder commits.
//!
//! ## Schema
//! ```sql
//! CREATE TABLE IF NOT EXISTS outbox_message (
//!     message_id          UUID PRIMARY KEY,
//!     outbox_id           UUID,
//!     sequence_number     BIGINT NOT NULL,
//!     destination_address TEXT,
//!     headers             JSONB NOT NULL DEFAULT '{}'::jsonb,
//!     payload             BYTEA NOT NULL
//! );
//! CREATE INDEX IF NOT EXISTS outbox_message_group
//!     ON outbox_message (outbox_id, sequence_number)
//!     WHERE outbox_id IS NOT NULL;
//!
//! CREATE TABLE IF NOT EXISTS outbox_state (
//!     outbox_id            UUID PRIMARY KEY,
//!     last_sequence_number BIGINT,
//!     delivered_at         BIGINT,
//!     version              BIGINT NOT NULL,
//!     lock_token           UUID
//! );
//! ```
//!
//! ## Rules
//! - Isolation is applied with `SET TRANSACTION ISOLATION LEVEL` as the first
//!   statement of every transaction.
//! - `statement_timeout` is set per transaction from [`TxOptions::timeout`];
//!   the session additionally enforces the deadline locally so a blocked
//!   lock acquisition cannot outlive the attempt.
//! - `retries_attempts()` is `true`: faulted attempts are re-run by the
//!   worker, accepting the documented re-send corner.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::{Postgres, Row, Transaction};
use tokio::time::{timeout_at, Instant};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::StoreError;
use crate::outbox::{MessageBody, MessageId, OutboxId, OutboxMessage, OutboxState};

use super::{
    LockStatementProvider, PostgresLockStatementProvider, Store, StoreSession, TxOptions,
};

const MESSAGE_TABLE: &str = "outbox_message";
const STATE_TABLE: &str = "outbox_state";

/// Schema bootstrap for the two outbox tables.
const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS outbox_message (
    message_id          UUID PRIMARY KEY,
    outbox_id           UUID,
    sequence_number     BIGINT NOT NULL,
    destination_address TEXT,
    headers             JSONB NOT NULL DEFAULT '{}'::jsonb,
    payload             BYTEA NOT NULL
);
CREATE INDEX IF NOT EXISTS outbox_message_group
    ON outbox_message (outbox_id, sequence_number)
    WHERE outbox_id IS NOT NULL;
CREATE TABLE IF NOT EXISTS outbox_state (
    outbox_id            UUID PRIMARY KEY,
    last_sequence_number BIGINT,
    delivered_at         BIGINT,
    version              BIGINT NOT NULL,
    lock_token           UUID
);
"#;

/// Relational store using native row locks for mutual exclusion.
pub struct PostgresStore {
    pool: PgPool,
    lock_statements: Arc<dyn LockStatementProvider>,
}

impl PostgresStore {
    /// Creates a store over an existing pool with the standard `FOR UPDATE`
    /// lock statement.
    pub fn new(pool: PgPool) -> Self {
        Self::with_lock_statements(pool, Arc::new(PostgresLockStatementProvider))
    }

    /// Creates a store with a custom lock-statement dialect.
    pub fn with_lock_statements(
        pool: PgPool,
        lock_statements: Arc<dyn LockStatementProvider>,
    ) -> Self {
        Self {
            pool,
            lock_statements,
        }
    }

    /// Creates the outbox tables if they do not exist.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(())
    }

    /// Inserts a message row, as the producer's transaction would.
    pub async fn enqueue(&self, message: &OutboxMessage) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO outbox_message \
             (message_id, outbox_id, sequence_number, destination_address, headers, payload) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(message.message_id.as_uuid())
        .bind(message.outbox_id.map(|id| id.as_uuid()))
        .bind(message.sequence_number as i64)
        .bind(message.destination_address.clone())
        .bind(sqlx::types::Json(message.body.headers.clone()))
        .bind(message.body.payload.clone())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(())
    }
}

#[async_trait]
impl Store for PostgresStore {
    async fn pending_outboxes(&self, limit: usize) -> Result<Vec<OutboxId>, StoreError> {
        let rows = sqlx::query(
            "SELECT outbox_id FROM outbox_message WHERE outbox_id IS NOT NULL LIMIT $1",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;

        rows.iter()
            .map(|row| {
                row.try_get::<Uuid, _>("outbox_id")
                    .map(OutboxId::from)
                    .map_err(map_sqlx)
            })
            .collect()
    }

    async fn begin(
        &self,
        opts: TxOptions,
        ctx: &CancellationToken,
    ) -> Result<Box<dyn StoreSession>, StoreError> {
        let deadline = Instant::now() + opts.timeout;

        let tx = tokio::select! {
            res = timeout_at(deadline, self.pool.begin()) => match res {
                Ok(tx) => tx.map_err(map_sqlx)?,
                Err(_elapsed) => return Err(StoreError::Timeout { timeout: opts.timeout }),
            },
            _ = ctx.cancelled() => return Err(StoreError::Canceled),
        };

        let mut session = PgSession {
            tx: Some(tx),
            lock_statements: Arc::clone(&self.lock_statements),
            deadline,
            timeout: opts.timeout,
            ctx: ctx.clone(),
        };

        session
            .execute(&format!(
                "SET TRANSACTION ISOLATION LEVEL {}",
                opts.isolation.as_sql()
            ))
            .await?;
        session
            .execute(&format!(
                "SET LOCAL statement_timeout = {}",
                opts.timeout.as_millis()
            ))
            .await?;

        Ok(Box::new(session))
    }

    fn retries_attempts(&self) -> bool {
        true
    }
}

struct PgSession {
    tx: Option<Transaction<'static, Postgres>>,
    lock_statements: Arc<dyn LockStatementProvider>,
    deadline: Instant,
    timeout: Duration,
    ctx: CancellationToken,
}

impl PgSession {
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

    fn tx(&mut self) -> Result<&mut Transaction<'static, Postgres>, StoreError> {
        self.tx
            .as_mut()
            .ok_or_else(|| StoreError::backend("transaction already finished"))
    }

    async fn execute(&mut self, sql: &str) -> Result<(), StoreError> {
        self.check()?;
        let deadline = self.deadline;
        let tx = self.tx()?;
        match timeout_at(deadline, sqlx::query(sql).execute(&mut **tx)).await {
            Ok(res) => res.map_err(map_sqlx).map(|_| ()),
            Err(_elapsed) => Err(StoreError::Timeout {
                timeout: self.timeout,
            }),
        }
    }
}

#[async_trait]
impl StoreSession for PgSession {
    async fn lock_state(&mut self, outbox: OutboxId) -> Result<Option<OutboxState>, StoreError> {
        self.check()?;
        let statement = self.lock_statements.row_lock_statement(STATE_TABLE);
        let deadline = self.deadline;
        let timeout = self.timeout;
        let tx = self.tx()?;

        let row = match timeout_at(
            deadline,
            sqlx::query(&statement)
                .bind(outbox.as_uuid())
                .fetch_optional(&mut **tx),
        )
        .await
        {
            Ok(res) => res.map_err(map_sqlx)?,
            Err(_elapsed) => return Err(StoreError::Timeout { timeout }),
        };

        row.map(|row| state_from_row(&row)).transpose()
    }

    async fn insert_state(&mut self, state: &OutboxState) -> Result<(), StoreError> {
        self.check()?;
        let deadline = self.deadline;
        let timeout = self.timeout;
        let tx = self.tx()?;

        let query = sqlx::query(
            "INSERT INTO outbox_state \
             (outbox_id, last_sequence_number, delivered_at, version, lock_token) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(state.outbox_id.as_uuid())
        .bind(state.last_sequence_number.map(|n| n as i64))
        .bind(delivered_to_millis(state.delivered_at))
        .bind(state.version as i64)
        .bind(state.lock_token.map(|t| t.as_uuid()));

        match timeout_at(deadline, query.execute(&mut **tx)).await {
            Ok(res) => res.map_err(map_sqlx).map(|_| ()),
            Err(_elapsed) => Err(StoreError::Timeout { timeout }),
        }
    }

    async fn replace_state(&mut self, state: &OutboxState) -> Result<(), StoreError> {
        self.check()?;
        let deadline = self.deadline;
        let timeout = self.timeout;
        let version = state.version;
        let tx = self.tx()?;

        let query = sqlx::query(
            "UPDATE outbox_state SET \
             last_sequence_number = $2, delivered_at = $3, version = $4, lock_token = $5 \
             WHERE outbox_id = $1 AND version < $4",
        )
        .bind(state.outbox_id.as_uuid())
        .bind(state.last_sequence_number.map(|n| n as i64))
        .bind(delivered_to_millis(state.delivered_at))
        .bind(state.version as i64)
        .bind(state.lock_token.map(|t| t.as_uuid()));

        let result = match timeout_at(deadline, query.execute(&mut **tx)).await {
            Ok(res) => res.map_err(map_sqlx)?,
            Err(_elapsed) => return Err(StoreError::Timeout { timeout }),
        };

        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict { version });
        }
        Ok(())
    }

    async fn pending_messages(
        &mut self,
        outbox: OutboxId,
        after: u64,
        limit: usize,
    ) -> Result<Vec<OutboxMessage>, StoreError> {
        self.check()?;
        let deadline = self.deadline;
        let timeout = self.timeout;
        let tx = self.tx()?;

        let query = sqlx::query(
            "SELECT message_id, outbox_id, sequence_number, destination_address, headers, payload \
             FROM outbox_message \
             WHERE outbox_id = $1 AND sequence_number > $2 \
             ORDER BY sequence_number ASC LIMIT $3",
        )
        .bind(outbox.as_uuid())
        .bind(after as i64)
        .bind(limit as i64);

        let rows = match timeout_at(deadline, query.fetch_all(&mut **tx)).await {
            Ok(res) => res.map_err(map_sqlx)?,
            Err(_elapsed) => return Err(StoreError::Timeout { timeout }),
        };

        rows.iter().map(message_from_row).collect()
    }

    async fn delete_message(&mut self, message: MessageId) -> Result<(), StoreError> {
        self.check()?;
        let deadline = self.deadline;
        let timeout = self.timeout;
        let tx = self.tx()?;

        let query = sqlx::query("DELETE FROM outbox_message WHERE message_id = $1")
            .bind(message.as_uuid());

        match timeout_at(deadline, query.execute(&mut **tx)).await {
            Ok(res) => res.map_err(map_sqlx).map(|_| ()),
            Err(_elapsed) => Err(StoreError::Timeout { timeout }),
        }
    }

    async fn purge_outbox(&mut self, outbox: OutboxId) -> Result<u64, StoreError> {
        self.check()?;
        let deadline = self.deadline;
        let timeout = self.timeout;
        let tx = self.tx()?;

        let removed = match timeout_at(
            deadline,
            sqlx::query(&format!(
                "DELETE FROM {MESSAGE_TABLE} WHERE outbox_id = $1"
            ))
            .bind(outbox.as_uuid())
            .execute(&mut **tx),
        )
        .await
        {
            Ok(res) => res.map_err(map_sqlx)?.rows_affected(),
            Err(_elapsed) => return Err(StoreError::Timeout { timeout }),
        };

        match timeout_at(
            deadline,
            sqlx::query(&format!("DELETE FROM {STATE_TABLE} WHERE outbox_id = $1"))
                .bind(outbox.as_uuid())
                .execute(&mut **tx),
        )
        .await
        {
            Ok(res) => res.map_err(map_sqlx)?,
            Err(_elapsed) => return Err(StoreError::Timeout { timeout }),
        };

        Ok(removed)
    }

    async fn commit(mut self: Box<Self>) -> Result<(), StoreError> {
        self.check()?;
        let tx = self
            .tx
            .take()
            .ok_or_else(|| StoreError::backend("transaction already finished"))?;
        tx.commit().await.map_err(map_sqlx)
    }

    async fn abort(mut self: Box<Self>) -> Result<(), StoreError> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| StoreError::backend("transaction already finished"))?;
        tx.rollback().await.map_err(map_sqlx)
    }
}

/// Maps sqlx failures onto the store taxonomy.
///
/// `55P03` (lock not available), `40001` (serialization failure) and `40P01`
/// (deadlock detected) are contention-class; everything else is a backend
/// fault.
fn map_sqlx(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        if let Some(code) = db.code() {
            if code == "55P03" || code == "40001" || code == "40P01" {
                return StoreError::LockBusy;
            }
        }
    }
    StoreError::backend(err.to_string())
}

fn delivered_to_millis(at: Option<SystemTime>) -> Option<i64> {
    at.map(|t| {
        t.duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
            .as_millis() as i64
    })
}

fn millis_to_delivered(millis: Option<i64>) -> Option<SystemTime> {
    millis.map(|ms| UNIX_EPOCH + Duration::from_millis(ms.max(0) as u64))
}

fn state_from_row(row: &PgRow) -> Result<OutboxState, StoreError> {
    Ok(OutboxState {
        outbox_id: OutboxId::from(row.try_get::<Uuid, _>("outbox_id").map_err(map_sqlx)?),
        last_sequence_number: row
            .try_get::<Option<i64>, _>("last_sequence_number")
            .map_err(map_sqlx)?
            .map(|n| n as u64),
        delivered_at: millis_to_delivered(
            row.try_get::<Option<i64>, _>("delivered_at")
                .map_err(map_sqlx)?,
        ),
        version: row.try_get::<i64, _>("version").map_err(map_sqlx)? as u64,
        lock_token: row
            .try_get::<Option<Uuid>, _>("lock_token")
            .map_err(map_sqlx)?
            .map(Into::into),
    })
}

fn message_from_row(row: &PgRow) -> Result<OutboxMessage, StoreError> {
    let headers: sqlx::types::Json<std::collections::HashMap<String, String>> =
        row.try_get("headers").map_err(map_sqlx)?;

    Ok(OutboxMessage {
        message_id: MessageId::from(row.try_get::<Uuid, _>("message_id").map_err(map_sqlx)?),
        outbox_id: row
            .try_get::<Option<Uuid>, _>("outbox_id")
            .map_err(map_sqlx)?
            .map(Into::into),
        sequence_number: row.try_get::<i64, _>("sequence_number").map_err(map_sqlx)? as u64,
        destination_address: row
            .try_get::<Option<String>, _>("destination_address")
            .map_err(map_sqlx)?,
        body: MessageBody {
            headers: headers.0,
            payload: row.try_get::<Vec<u8>, _>("payload").map_err(map_sqlx)?,
        },
    })
}
