//! Drain a seeded in-memory outbox to a stdout transport.
//!
//! Run with: `cargo run --example relay_drain`

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use outboxvisor::{
    Envelope, LockStrategy, LogWriter, MemoryStore, MessageBody, OutboxId, OutboxMessage, Relay,
    RelayConfig, SendEndpoint, SendError, Subscribe, Transport,
};

/// Transport that "acknowledges" every message by printing it.
struct StdoutTransport;

struct StdoutEndpoint;

#[async_trait]
impl Transport for StdoutTransport {
    async fn wait_until_ready(&self, _ctx: &CancellationToken) -> Result<(), SendError> {
        Ok(())
    }

    async fn endpoint(&self, _address: &str) -> Result<Arc<dyn SendEndpoint>, SendError> {
        Ok(Arc::new(StdoutEndpoint))
    }
}

#[async_trait]
impl SendEndpoint for StdoutEndpoint {
    async fn send(&self, envelope: Envelope, _ctx: &CancellationToken) -> Result<(), SendError> {
        println!(
            "  -> broker ack: dest={} outbox={} seq={} payload={}",
            envelope.destination,
            envelope.outbox_id,
            envelope.sequence_number,
            String::from_utf8_lossy(&envelope.payload),
        );
        Ok(())
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let mut cfg = RelayConfig::default();
    cfg.query_delay = Duration::from_millis(100);
    cfg.message_delivery_limit = 3;

    // Producer side: two conversations land rows in the outbox.
    let store = Arc::new(MemoryStore::new(LockStrategy::LeaseToken));
    let orders = OutboxId::generate();
    let invoices = OutboxId::generate();
    for seq in 1..=7 {
        store.enqueue(OutboxMessage::new(
            orders,
            seq,
            "queue:orders",
            MessageBody::new(format!("order event {seq}")).with_header("conversation", "orders"),
        ));
    }
    for seq in 1..=4 {
        store.enqueue(OutboxMessage::new(
            invoices,
            seq,
            "queue:invoices",
            MessageBody::new(format!("invoice event {seq}")),
        ));
    }
    println!("seeded {} messages", store.total_messages());

    let subscribers: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter)];
    let relay = Arc::new(Relay::new(
        cfg,
        Arc::clone(&store) as _,
        Arc::new(StdoutTransport) as _,
        subscribers,
    ));

    let token = CancellationToken::new();
    let runner = {
        let relay = Arc::clone(&relay);
        let token = token.clone();
        tokio::spawn(async move { relay.run(token).await })
    };

    // Stop once both outboxes are fully drained.
    while !(store.is_drained(orders) && store.is_drained(invoices)) {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    token.cancel();
    let _ = runner.await;

    println!("done: all outboxes drained, tables empty");
}
