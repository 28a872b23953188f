//! Two relay instances competing for one outbox over a lease-token store.
//!
//! The token CAS lets exactly one instance hold an outbox at a time; the
//! loser backs off and retries. Every message is sent exactly once.
//!
//! Run with: `cargo run --example lease_contention`

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use outboxvisor::{
    Envelope, LockStrategy, MemoryStore, MessageBody, OutboxId, OutboxMessage, Relay, RelayConfig,
    SendEndpoint, SendError, Subscribe, Transport,
};

/// Transport that counts acknowledged sends per relay instance.
struct CountingTransport {
    name: &'static str,
    sent: Arc<AtomicUsize>,
}

struct CountingEndpoint {
    name: &'static str,
    sent: Arc<AtomicUsize>,
}

#[async_trait]
impl Transport for CountingTransport {
    async fn wait_until_ready(&self, _ctx: &CancellationToken) -> Result<(), SendError> {
        Ok(())
    }

    async fn endpoint(&self, _address: &str) -> Result<Arc<dyn SendEndpoint>, SendError> {
        Ok(Arc::new(CountingEndpoint {
            name: self.name,
            sent: Arc::clone(&self.sent),
        }))
    }
}

#[async_trait]
impl SendEndpoint for CountingEndpoint {
    async fn send(&self, envelope: Envelope, _ctx: &CancellationToken) -> Result<(), SendError> {
        self.sent.fetch_add(1, Ordering::SeqCst);
        println!("  [{}] acked seq={}", self.name, envelope.sequence_number);
        Ok(())
    }
}

#[tokio::main]
async fn main() {
    let mut cfg = RelayConfig::default();
    cfg.query_delay = Duration::from_millis(50);
    cfg.message_delivery_limit = 2;
    cfg.lock_retry_limit = 20;

    let store = Arc::new(MemoryStore::new(LockStrategy::LeaseToken));
    let outbox = OutboxId::generate();
    for seq in 1..=10 {
        store.enqueue(OutboxMessage::new(
            outbox,
            seq,
            "queue:orders",
            MessageBody::new(format!("event {seq}")),
        ));
    }

    let sent_a = Arc::new(AtomicUsize::new(0));
    let sent_b = Arc::new(AtomicUsize::new(0));
    let no_subscribers: Vec<Arc<dyn Subscribe>> = Vec::new();

    let relay_a = Arc::new(Relay::new(
        cfg.clone(),
        Arc::clone(&store) as _,
        Arc::new(CountingTransport {
            name: "relay-a",
            sent: Arc::clone(&sent_a),
        }) as _,
        no_subscribers.clone(),
    ));
    let relay_b = Arc::new(Relay::new(
        cfg,
        Arc::clone(&store) as _,
        Arc::new(CountingTransport {
            name: "relay-b",
            sent: Arc::clone(&sent_b),
        }) as _,
        no_subscribers,
    ));

    let token = CancellationToken::new();
    let run_a = {
        let relay = Arc::clone(&relay_a);
        let token = token.clone();
        tokio::spawn(async move { relay.run(token).await })
    };
    let run_b = {
        let relay = Arc::clone(&relay_b);
        let token = token.clone();
        tokio::spawn(async move { relay.run(token).await })
    };

    while !store.is_drained(outbox) {
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    token.cancel();
    let _ = run_a.await;
    let _ = run_b.await;

    let a = sent_a.load(Ordering::SeqCst);
    let b = sent_b.load(Ordering::SeqCst);
    println!("relay-a sent {a}, relay-b sent {b}, total {}", a + b);
    assert_eq!(a + b, 10, "every message is sent exactly once");
}
