//! # Simple logging subscriber for debugging and demos.
//!
//! [`LogWriter`] prints events to stdout in a human-readable format.
//!
//! ## Output format
//! ```text
//! [sent] outbox=… seq=3 message=…
//! [send-fault] outbox=… seq=4 err="broker unavailable"
//! [skip] outbox=… seq=5 no destination address
//! [delivered] outbox=…
//! [removed] outbox=… count=12
//! [worker-fault] outbox=… err="store backend failure: …"
//! [pass-fault] err="…"
//! [shutdown-requested]
//! ```
//!
//! ## Example
//! ```no_run
//! # use std::sync::Arc;
//! # use outboxvisor::{LogWriter, Subscribe};
//! let subscribers: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter)];
//! ```

use async_trait::async_trait;

use crate::events::{Event, EventKind};

use super::Subscribe;

/// Simple stdout logging subscriber.
///
/// Enabled via the `logging` feature. Prints human-readable event lines for
/// debugging and demonstration purposes. For production, implement a custom
/// [`Subscribe`] targeting your logging or metrics backend.
pub struct LogWriter;

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        match e.kind {
            EventKind::MessageSent => {
                if let (Some(outbox), Some(seq), Some(message)) = (e.outbox, e.sequence, e.message)
                {
                    println!("[sent] outbox={outbox} seq={seq} message={message}");
                }
            }
            EventKind::SendFaulted => {
                println!(
                    "[send-fault] outbox={:?} seq={:?} message={:?} err={:?}",
                    e.outbox, e.sequence, e.message, e.error
                );
            }
            EventKind::DestinationMissing => {
                println!(
                    "[skip] outbox={:?} seq={:?} no destination address",
                    e.outbox, e.sequence
                );
            }
            EventKind::OutboxDelivered => {
                println!("[delivered] outbox={:?}", e.outbox);
            }
            EventKind::OutboxRemoved => {
                println!("[removed] outbox={:?} count={:?}", e.outbox, e.count);
            }
            EventKind::WorkerStarting => {
                if let (Some(outbox), Some(att)) = (e.outbox, e.attempt) {
                    println!("[worker-starting] outbox={outbox} attempt={att}");
                }
            }
            EventKind::WorkerStopped => {
                println!("[worker-stopped] outbox={:?}", e.outbox);
            }
            EventKind::WorkerFaulted => {
                println!("[worker-fault] outbox={:?} err={:?}", e.outbox, e.error);
            }
            EventKind::LockRetryScheduled => {
                println!(
                    "[lock-retry] outbox={:?} delay={:?} attempt={:?} err={:?}",
                    e.outbox, e.delay, e.attempt, e.error
                );
            }
            EventKind::RollbackFaulted => {
                println!("[rollback-fault] outbox={:?} err={:?}", e.outbox, e.error);
            }
            EventKind::PassFaulted => {
                println!("[pass-fault] err={:?}", e.error);
            }
            EventKind::ShutdownRequested => {
                println!("[shutdown-requested]");
            }
            EventKind::AllStoppedWithin => {
                println!("[all-stopped-within-grace]");
            }
            EventKind::GraceExceeded => {
                println!("[grace-exceeded]");
            }
            EventKind::SubscriberOverflow | EventKind::SubscriberPanicked => {
                println!("[subscriber] err={:?}", e.error);
            }
        }
    }

    fn name(&self) -> &'static str {
        "log"
    }
}
