//! Cleanup and state-machine invariants: two-phase delivered marker,
//! version monotonicity, cursor/rows agreement.

use std::collections::BTreeSet;

use crate::core::Attempt;
use crate::{EventKind, OutboxId};

use super::harness::{collect_events, malformed_message, message, Rig};

/// The attempt that sets `delivered_at` commits and returns `Continue`;
/// rows are removed only by the following attempt.
#[tokio::test]
async fn delivered_marker_commits_before_cleanup() {
    let rig = Rig::lease();
    let outbox = OutboxId::generate();
    rig.seed(outbox, 2);

    assert!(matches!(rig.attempt(outbox).await, Ok(Attempt::Continue)));
    assert!(matches!(rig.attempt(outbox).await, Ok(Attempt::Continue)));

    // Both messages sent and deleted, the drained marker is durable, and the
    // state row still exists: cleanup has not run yet.
    let state = rig.mem.state(outbox).expect("state row still present");
    assert!(state.is_delivered());
    assert_eq!(rig.mem.message_count(outbox), 0);

    assert!(matches!(rig.attempt(outbox).await, Ok(Attempt::Done)));
    assert!(rig.mem.is_drained(outbox));
}

/// Cleanup reports how many rows it removed, including skipped leftovers.
#[tokio::test]
async fn cleanup_reports_removed_row_count() {
    let rig = Rig::lease();
    let outbox = OutboxId::generate();
    rig.mem.enqueue(message(outbox, 1));
    rig.mem.enqueue(malformed_message(outbox, 2));

    let mut rx = rig.bus.subscribe();

    assert!(matches!(rig.attempt(outbox).await, Ok(Attempt::Continue)));
    assert!(matches!(rig.attempt(outbox).await, Ok(Attempt::Continue)));
    assert!(matches!(rig.attempt(outbox).await, Ok(Attempt::Done)));

    let events = collect_events(&mut rx);
    let removed = events
        .iter()
        .find(|e| e.kind == EventKind::OutboxRemoved)
        .expect("cleanup event");
    assert_eq!(removed.outbox, Some(outbox));
    assert_eq!(removed.count, Some(1));
    assert!(rig.mem.is_drained(outbox));
}

/// `version` strictly increases across every committed replacement.
#[tokio::test]
async fn version_strictly_increases() {
    let mut rig = Rig::lease();
    rig.cfg.message_delivery_limit = 5;
    let outbox = OutboxId::generate();
    rig.seed(outbox, 12);

    assert!(matches!(rig.attempt(outbox).await, Ok(Attempt::Continue)));
    let mut versions = vec![rig.mem.state(outbox).expect("state").version];

    // Three delivery passes: 5 + 5 + 2 (the last one marks delivered).
    for _ in 0..3 {
        assert!(matches!(rig.attempt(outbox).await, Ok(Attempt::Continue)));
        versions.push(rig.mem.state(outbox).expect("state").version);
    }

    assert_eq!(versions, vec![1, 2, 3, 4]);
}

/// After every committed attempt the remaining sequence numbers are exactly
/// those above the cursor (skip-free run).
#[tokio::test]
async fn remaining_rows_match_the_cursor() {
    let mut rig = Rig::lease();
    rig.cfg.message_delivery_limit = 5;
    let outbox = OutboxId::generate();
    rig.seed(outbox, 12);

    assert!(matches!(rig.attempt(outbox).await, Ok(Attempt::Continue)));

    loop {
        let before = rig.mem.state(outbox).expect("state");
        if before.is_delivered() {
            break;
        }
        assert!(matches!(rig.attempt(outbox).await, Ok(Attempt::Continue)));

        let state = rig.mem.state(outbox).expect("state");
        let cursor = state.cursor();
        let remaining: BTreeSet<u64> = (cursor + 1..=12).collect();
        let stored: BTreeSet<u64> = rig
            .mem
            .pending_sequences(outbox)
            .into_iter()
            .collect();
        assert_eq!(stored, remaining);
    }

    assert!(matches!(rig.attempt(outbox).await, Ok(Attempt::Done)));
    assert!(rig.mem.is_drained(outbox));
    assert_eq!(
        rig.transport.sequences_for(outbox),
        (1..=12).collect::<Vec<_>>()
    );
}
