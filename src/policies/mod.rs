//! Retry delay policies.
//!
//! The relay itself never retries a failed pass (the next poll is the retry);
//! the only in-process retry loop is the worker re-attempting a *contended
//! lock acquisition*, and these policies shape its delays:
//!
//! - [`BackoffPolicy`] growth of the delay between retries
//! - [`JitterPolicy`] randomization to de-correlate competing relay instances

mod backoff;
mod jitter;

pub use backoff::BackoffPolicy;
pub use jitter::JitterPolicy;
