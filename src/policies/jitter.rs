//! # Jitter policy for retry delays.
//!
//! [`JitterPolicy`] adds randomness to backoff delays so that multiple relay
//! instances competing for the same outbox do not retry in lockstep.
//!
//! - [`JitterPolicy::None`] no randomization, predictable delays
//! - [`JitterPolicy::Full`] random delay in `[0, delay]`
//! - [`JitterPolicy::Equal`] `delay/2 + random[0, delay/2]`

use std::time::Duration;

use rand::Rng;

/// Policy controlling randomization of retry delays.
///
/// ## Trade-offs
/// - **None**: predictable, but competing instances retry in lockstep
/// - **Full**: maximum randomness, aggressive load spreading
/// - **Equal**: preserves at least half of the backoff (recommended)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JitterPolicy {
    /// No jitter: use the exact backoff delay.
    None,
    /// Full jitter: random delay in `[0, delay]`.
    Full,
    /// Equal jitter: `delay/2 + random[0, delay/2]`.
    Equal,
}

impl Default for JitterPolicy {
    /// Returns [`JitterPolicy::Equal`].
    fn default() -> Self {
        JitterPolicy::Equal
    }
}

impl JitterPolicy {
    /// Applies jitter to the given delay.
    ///
    /// Zero delays pass through untouched regardless of policy.
    pub fn apply(&self, delay: Duration) -> Duration {
        if delay.is_zero() {
            return delay;
        }
        match self {
            JitterPolicy::None => delay,
            JitterPolicy::Full => {
                let nanos = delay.as_nanos() as u64;
                Duration::from_nanos(rand::thread_rng().gen_range(0..=nanos))
            }
            JitterPolicy::Equal => {
                let half = delay.as_nanos() as u64 / 2;
                Duration::from_nanos(half + rand::thread_rng().gen_range(0..=half.max(1)))
            }
        }
    }
}
