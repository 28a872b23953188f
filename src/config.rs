//! # Global relay configuration.
//!
//! [`RelayConfig`] defines the relay's behavior: polling cadence, transaction
//! and send deadlines, batch limits, lock-retry policy, concurrency limits,
//! event bus capacity, and the shutdown grace period.
//!
//! # Example
//! ```
//! use std::time::Duration;
//! use outboxvisor::{RelayConfig, IsolationLevel};
//!
//! let mut cfg = RelayConfig::default();
//! cfg.query_delay = Duration::from_millis(250);
//! cfg.message_delivery_limit = 50;
//! cfg.isolation = IsolationLevel::Serializable;
//!
//! assert_eq!(cfg.message_delivery_limit, 50);
//! ```

use std::time::Duration;

use crate::policies::BackoffPolicy;
use crate::store::IsolationLevel;

/// Global configuration for the relay runtime.
///
/// Controls the polling dispatcher, per-attempt store transactions, per-send
/// deadlines, and graceful shutdown.
#[derive(Clone, Debug)]
pub struct RelayConfig {
    /// Sleep between polling passes.
    pub query_delay: Duration,
    /// Deadline for one store transaction (one delivery attempt).
    pub query_timeout: Duration,
    /// Maximum message rows scanned per pass when discovering pending outboxes.
    pub query_message_limit: usize,
    /// Maximum messages sent per attempt for one outbox.
    pub message_delivery_limit: usize,
    /// Deadline for one transport send, composed with the outer cancellation.
    pub message_delivery_timeout: Duration,
    /// Transaction isolation level for stores that honor one.
    pub isolation: IsolationLevel,
    /// Maximum number of workers running concurrently (0 = unlimited).
    pub max_concurrent: usize,
    /// Capacity of the event bus channel.
    pub bus_capacity: usize,
    /// Maximum time to wait for in-flight workers during shutdown.
    pub grace: Duration,
    /// Delay policy applied between lock-contention retries.
    pub lock_backoff: BackoffPolicy,
    /// Contended-lock retries per worker before deferring to the next pass.
    pub lock_retry_limit: u32,
}

impl Default for RelayConfig {
    /// Provides a default configuration:
    /// - `query_delay = 1s`
    /// - `query_timeout = 10s`
    /// - `query_message_limit = 100`
    /// - `message_delivery_limit = 10`
    /// - `message_delivery_timeout = 5s`
    /// - `isolation = RepeatableRead`
    /// - `max_concurrent = 0` (unlimited)
    /// - `bus_capacity = 1024`
    /// - `grace = 30s`
    /// - `lock_backoff = BackoffPolicy::default()`
    /// - `lock_retry_limit = 3`
    fn default() -> Self {
        Self {
            query_delay: Duration::from_secs(1),
            query_timeout: Duration::from_secs(10),
            query_message_limit: 100,
            message_delivery_limit: 10,
            message_delivery_timeout: Duration::from_secs(5),
            isolation: IsolationLevel::RepeatableRead,
            max_concurrent: 0,
            bus_capacity: 1024,
            grace: Duration::from_secs(30),
            lock_backoff: BackoffPolicy::default(),
            lock_retry_limit: 3,
        }
    }
}
