//! Concurrency: parallel outboxes, competing relay instances, lock strategies.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::core::WorkerExit;
use crate::{OutboxId, Relay, Store, StoreError, StoreSession, Subscribe, TxOptions};

use super::harness::{wait_until, Rig};

fn tx_opts() -> TxOptions {
    TxOptions {
        isolation: crate::IsolationLevel::RepeatableRead,
        timeout: Duration::from_secs(2),
    }
}

/// Two outboxes with one message each: two workers run in the same pass and
/// both outboxes drain, in any interleaving.
#[tokio::test]
async fn two_outboxes_drain_in_parallel() {
    let rig = Rig::lease();
    let a = OutboxId::generate();
    let b = OutboxId::generate();
    rig.seed(a, 1);
    rig.seed(b, 1);

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

    assert_eq!(rig.transport.sequences_for(a), vec![1]);
    assert_eq!(rig.transport.sequences_for(b), vec![1]);
}

/// Two relay instances competing for the same outbox over a lease-token
/// store: the token CAS serializes them, every message is sent exactly once.
#[tokio::test]
async fn competing_workers_never_duplicate() {
    let mut rig = Rig::lease();
    rig.cfg.lock_retry_limit = 50;
    let outbox = OutboxId::generate();
    rig.seed(outbox, 10);

    let first = rig.worker();
    let second = rig.worker();
    let (exit_a, exit_b) = tokio::join!(
        first.run(outbox, CancellationToken::new()),
        second.run(outbox, CancellationToken::new()),
    );

    // Whatever the interleaving, neither worker may duplicate a send.
    assert_ne!(exit_a, WorkerExit::Canceled);
    assert_ne!(exit_b, WorkerExit::Canceled);

    let mut sequences = rig.transport.sequences_for(outbox);
    sequences.sort_unstable();
    assert_eq!(sequences, (1..=10).collect::<Vec<_>>());
    assert_eq!(rig.transport.sent_count(), 10);

    // At least one of the two finished the cleanup pass.
    wait_until(Duration::from_secs(2), || rig.mem.is_drained(outbox)).await;
}

/// The lease-token CAS fails fast for the second holder.
#[tokio::test]
async fn lease_token_cas_fails_fast() {
    let rig = Rig::lease();
    let outbox = OutboxId::generate();
    rig.seed(outbox, 1);

    let ctx = CancellationToken::new();
    let mut first = rig.mem.begin(tx_opts(), &ctx).await.expect("first session");
    first.lock_state(outbox).await.expect("first lock");

    let mut second = rig.mem.begin(tx_opts(), &ctx).await.expect("second session");
    let err = second
        .lock_state(outbox)
        .await
        .expect_err("second lock must lose the CAS");
    assert!(matches!(err, StoreError::LockBusy));

    // Releasing the first holder frees the row for the next acquisition.
    first.abort().await.expect("first abort");
    second.abort().await.expect("second abort");

    let mut third = rig.mem.begin(tx_opts(), &ctx).await.expect("third session");
    assert!(third.lock_state(outbox).await.is_ok());
    third.abort().await.expect("third abort");
}

/// The row-lock strategy blocks the second holder until the first commits.
#[tokio::test]
async fn row_lock_blocks_until_release() {
    let rig = Rig::row_lock();
    let outbox = OutboxId::generate();
    rig.seed(outbox, 1);

    let ctx = CancellationToken::new();
    let mut first = rig.mem.begin(tx_opts(), &ctx).await.expect("first session");
    first.lock_state(outbox).await.expect("first lock");

    let store = Arc::clone(&rig.mem);
    let contender_ctx = ctx.clone();
    let contender = tokio::spawn(async move {
        let mut session = store
            .begin(tx_opts(), &contender_ctx)
            .await
            .expect("contender session");
        session.lock_state(outbox).await.expect("contender lock");
        session.abort().await.expect("contender abort");
    });

    // The contender cannot finish while the row is held.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!contender.is_finished());

    first.abort().await.expect("first abort");
    tokio::time::timeout(Duration::from_secs(1), contender)
        .await
        .expect("contender must acquire after release")
        .expect("contender task");
}

/// A row lock that is never released times out at the transaction deadline.
#[tokio::test]
async fn row_lock_acquisition_times_out() {
    let rig = Rig::row_lock();
    let outbox = OutboxId::generate();

    let ctx = CancellationToken::new();
    let mut first = rig.mem.begin(tx_opts(), &ctx).await.expect("first session");
    first.lock_state(outbox).await.expect("first lock");

    let short = TxOptions {
        isolation: crate::IsolationLevel::RepeatableRead,
        timeout: Duration::from_millis(50),
    };
    let mut second = rig.mem.begin(short, &ctx).await.expect("second session");
    let err = second
        .lock_state(outbox)
        .await
        .expect_err("acquisition must hit the deadline");
    assert!(matches!(err, StoreError::Timeout { .. }));

    first.abort().await.expect("first abort");
    second.abort().await.expect("second abort");
}
