//! Baseline delivery scenarios: single message, batch limits, quiescence.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::core::{Attempt, WorkerExit};
use crate::{OutboxId, Relay, Subscribe};

use super::harness::{wait_until, Rig};

/// One outbox, one message, destination present: one send, outbox deleted.
#[tokio::test]
async fn single_message_is_sent_and_cleaned_up() {
    let rig = Rig::lease();
    let outbox = OutboxId::generate();
    rig.seed(outbox, 1);

    let exit = rig.run_worker(outbox).await;

    assert_eq!(exit, WorkerExit::Completed);
    assert_eq!(rig.transport.sequences_for(outbox), vec![1]);
    assert!(rig.mem.is_drained(outbox));
}

/// `message_delivery_limit + 5` messages: the first delivery attempt sends
/// exactly the limit, the second sends the remainder and marks delivered,
/// the third cleans up.
#[tokio::test]
async fn batch_limit_bounds_one_attempt() {
    let rig = Rig::lease();
    let outbox = OutboxId::generate();
    let limit = rig.cfg.message_delivery_limit as u64;
    rig.seed(outbox, limit + 5);

    // First attempt only creates the state row.
    assert!(matches!(rig.attempt(outbox).await, Ok(Attempt::Continue)));
    let state = rig.mem.state(outbox).expect("state row inserted");
    assert_eq!(state.version, 1);
    assert_eq!(state.last_sequence_number, None);

    // Second attempt sends a full batch and defers the drained decision.
    assert!(matches!(rig.attempt(outbox).await, Ok(Attempt::Continue)));
    let state = rig.mem.state(outbox).expect("state row kept");
    assert_eq!(state.last_sequence_number, Some(limit));
    assert!(!state.is_delivered());
    assert_eq!(rig.transport.sent_count() as u64, limit);

    // Third attempt sends the remainder and marks delivered.
    assert!(matches!(rig.attempt(outbox).await, Ok(Attempt::Continue)));
    let state = rig.mem.state(outbox).expect("state row kept");
    assert_eq!(state.last_sequence_number, Some(limit + 5));
    assert!(state.is_delivered());
    assert_eq!(rig.mem.message_count(outbox), 0);

    // Fourth attempt cleans up.
    assert!(matches!(rig.attempt(outbox).await, Ok(Attempt::Done)));
    assert!(rig.mem.is_drained(outbox));

    let sequences = rig.transport.sequences_for(outbox);
    let expected: Vec<u64> = (1..=limit + 5).collect();
    assert_eq!(sequences, expected);
}

/// The dispatcher against an empty store is a no-op.
#[tokio::test]
async fn empty_store_is_a_noop() {
    let rig = Rig::lease();
    let subscribers: Vec<Arc<dyn Subscribe>> = Vec::new();
    let relay = Arc::new(Relay::new(
        rig.cfg.clone(),
        Arc::clone(&rig.store),
        Arc::clone(&rig.transport) as _,
        subscribers,
    ));

    let token = CancellationToken::new();
    let handle = {
        let relay = Arc::clone(&relay);
        let token = token.clone();
        tokio::spawn(async move { relay.run(token).await })
    };

    tokio::time::sleep(Duration::from_millis(100)).await;
    token.cancel();
    handle.await.expect("dispatcher task");

    assert_eq!(rig.transport.sent_count(), 0);
    assert_eq!(rig.mem.total_messages(), 0);
}

/// The relay drains several outboxes to quiescence: the transport received
/// every message in ascending per-outbox order and the tables are empty.
#[tokio::test]
async fn relay_runs_to_quiescence() {
    let rig = Rig::lease();
    let a = OutboxId::generate();
    let b = OutboxId::generate();
    rig.seed(a, 7);
    rig.seed(b, 7);

    let subscribers: Vec<Arc<dyn Subscribe>> = Vec::new();
    let relay = Arc::new(Relay::new(
        rig.cfg.clone(),
        Arc::clone(&rig.store),
        Arc::clone(&rig.transport) as _,
        subscribers,
    ));

    let token = CancellationToken::new();
    let handle = {
        let relay = Arc::clone(&relay);
        let token = token.clone();
        tokio::spawn(async move { relay.run(token).await })
    };

    let mem = Arc::clone(&rig.mem);
    wait_until(Duration::from_secs(5), || {
        mem.is_drained(a) && mem.is_drained(b)
    })
    .await;
    token.cancel();
    handle.await.expect("dispatcher task");

    assert_eq!(rig.transport.sent_count(), 14);
    assert_eq!(rig.transport.sequences_for(a), (1..=7).collect::<Vec<_>>());
    assert_eq!(rig.transport.sequences_for(b), (1..=7).collect::<Vec<_>>());
}
