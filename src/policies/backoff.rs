//! # Backoff policy for contended-lock retries.
//!
//! [`BackoffPolicy`] controls how retry delays grow when a worker repeatedly
//! loses the outbox state-row lock to another relay instance. It is
//! parameterized by:
//! - [`BackoffPolicy::first`] the initial delay;
//! - [`BackoffPolicy::factor`] the multiplicative growth factor;
//! - [`BackoffPolicy::max`] the maximum delay cap;
//! - [`BackoffPolicy::jitter`] optional randomization.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use outboxvisor::{BackoffPolicy, JitterPolicy};
//!
//! let backoff = BackoffPolicy {
//!     first: Duration::from_millis(50),
//!     max: Duration::from_secs(2),
//!     factor: 2.0,
//!     jitter: JitterPolicy::None,
//! };
//!
//! // First retry uses `first` (clamped to `max`).
//! assert_eq!(backoff.next(None), Duration::from_millis(50));
//!
//! // Subsequent retries multiply the previous delay by `factor`.
//! assert_eq!(backoff.next(Some(Duration::from_millis(50))), Duration::from_millis(100));
//!
//! // Growth is capped at `max`.
//! assert_eq!(backoff.next(Some(Duration::from_secs(5))), Duration::from_secs(2));
//! ```

use std::time::Duration;

use super::jitter::JitterPolicy;

/// Retry backoff policy.
///
/// Encapsulates parameters that determine how retry delays grow:
/// - [`first`](Self::first) the initial delay;
/// - [`factor`](Self::factor) multiplicative growth factor;
/// - [`max`](Self::max) the maximum delay cap.
#[derive(Clone, Copy, Debug)]
pub struct BackoffPolicy {
    /// Initial delay before the first retry.
    pub first: Duration,
    /// Maximum delay cap for retries.
    pub max: Duration,
    /// Multiplicative growth factor (`>= 1.0` recommended).
    pub factor: f64,
    /// Jitter policy to de-correlate competing relay instances.
    pub jitter: JitterPolicy,
}

impl Default for BackoffPolicy {
    /// Returns a policy with:
    /// - `first = 50ms`;
    /// - `max = 2s`;
    /// - `factor = 2.0`;
    /// - `jitter = JitterPolicy::Equal`.
    fn default() -> Self {
        Self {
            first: Duration::from_millis(50),
            max: Duration::from_secs(2),
            factor: 2.0,
            jitter: JitterPolicy::Equal,
        }
    }
}

impl BackoffPolicy {
    /// Computes the next delay based on the previous one.
    ///
    /// - If `prev` is `None`, returns `first` **clamped to `max`**.
    /// - Otherwise multiplies the previous delay by [`factor`](Self::factor)
    ///   and caps it at [`max`](Self::max).
    ///
    /// Jitter is applied after clamping, so the returned delay may be below
    /// the deterministic value but never above `max`.
    pub fn next(&self, prev: Option<Duration>) -> Duration {
        let unclamped = match prev {
            None => self.first,
            Some(p) => {
                let scaled = p.as_secs_f64() * self.factor.max(0.0);
                Duration::from_secs_f64(scaled.min(self.max.as_secs_f64()))
            }
        };
        let clamped = unclamped.min(self.max);
        self.jitter.apply(clamped)
    }
}
