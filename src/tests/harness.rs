//! Test harness for relay integration tests.
//!
//! Provides:
//! - `MockTransport`: a scriptable transport that records acknowledged sends
//! - `ChaosStore`: a store wrapper that injects commit/abort faults
//! - `Rig`: bundles a store, transport, bus, and config for driving workers
//!   and attempts directly

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::core::{run_attempt, Attempt, DeliveryWorker, WorkerExit};
use crate::{
    Bus, Envelope, Event, JitterPolicy, LockStrategy, MemoryStore, MessageBody, OutboxId,
    OutboxMessage, RelayConfig, SendEndpoint, SendError, Store, StoreError, StoreRef,
    StoreSession, Transport, TransportRef, TxOptions,
};

/// Destination used by seeded messages.
pub const DEST: &str = "queue:orders";

/// Scripted outcome for one send.
#[derive(Debug, Clone)]
pub enum SendResponse {
    /// Acknowledge and record the envelope.
    Accept,
    /// Fail the send.
    Reject,
    /// Never acknowledge (for deadline testing).
    Stall,
}

struct TransportShared {
    healthy: AtomicBool,
    sent: Mutex<Vec<Envelope>>,
    script: Mutex<VecDeque<SendResponse>>,
    unresolvable: Mutex<HashSet<String>>,
}

/// Mock transport speaking the relay's adapter contract.
pub struct MockTransport {
    shared: Arc<TransportShared>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            shared: Arc::new(TransportShared {
                healthy: AtomicBool::new(true),
                sent: Mutex::new(Vec::new()),
                script: Mutex::new(VecDeque::new()),
                unresolvable: Mutex::new(HashSet::new()),
            }),
        })
    }

    /// Toggles the health gate.
    pub fn set_healthy(&self, healthy: bool) {
        self.shared.healthy.store(healthy, AtomicOrdering::SeqCst);
    }

    /// Queues a scripted response for the next send; defaults to `Accept`
    /// once the queue is empty.
    pub fn queue_response(&self, response: SendResponse) {
        self.shared.script.lock().unwrap().push_back(response);
    }

    /// Queues `n` rejections.
    pub fn queue_rejects(&self, n: usize) {
        for _ in 0..n {
            self.queue_response(SendResponse::Reject);
        }
    }

    /// Makes endpoint resolution fail for `address`.
    pub fn make_unresolvable(&self, address: &str) {
        self.shared
            .unresolvable
            .lock()
            .unwrap()
            .insert(address.to_string());
    }

    /// All acknowledged envelopes, in acknowledgement order.
    pub fn sent(&self) -> Vec<Envelope> {
        self.shared.sent.lock().unwrap().clone()
    }

    /// Count of acknowledged envelopes.
    pub fn sent_count(&self) -> usize {
        self.shared.sent.lock().unwrap().len()
    }

    /// Acknowledged sequence numbers of one outbox, in acknowledgement order.
    pub fn sequences_for(&self, outbox: OutboxId) -> Vec<u64> {
        self.shared
            .sent
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.outbox_id == outbox)
            .map(|e| e.sequence_number)
            .collect()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn wait_until_ready(&self, ctx: &CancellationToken) -> Result<(), SendError> {
        loop {
            if ctx.is_cancelled() {
                return Err(SendError::Canceled);
            }
            if self.shared.healthy.load(AtomicOrdering::SeqCst) {
                return Ok(());
            }
            sleep(Duration::from_millis(5)).await;
        }
    }

    async fn endpoint(&self, address: &str) -> Result<Arc<dyn SendEndpoint>, SendError> {
        if self.shared.unresolvable.lock().unwrap().contains(address) {
            return Err(SendError::EndpointUnresolved {
                address: address.to_string(),
            });
        }
        Ok(Arc::new(MockEndpoint {
            shared: Arc::clone(&self.shared),
        }))
    }
}

struct MockEndpoint {
    shared: Arc<TransportShared>,
}

#[async_trait]
impl SendEndpoint for MockEndpoint {
    async fn send(&self, envelope: Envelope, ctx: &CancellationToken) -> Result<(), SendError> {
        let response = self
            .shared
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(SendResponse::Accept);

        match response {
            SendResponse::Accept => {
                self.shared.sent.lock().unwrap().push(envelope);
                Ok(())
            }
            SendResponse::Reject => Err(SendError::Rejected {
                reason: "scripted rejection".into(),
            }),
            SendResponse::Stall => {
                ctx.cancelled().await;
                Err(SendError::Canceled)
            }
        }
    }
}

/// Store wrapper injecting commit/abort faults by commit index.
pub struct ChaosStore {
    inner: Arc<MemoryStore>,
    commits_seen: Arc<AtomicU64>,
    fail_commit_at: Arc<Mutex<HashSet<u64>>>,
    fail_aborts: Arc<AtomicU64>,
}

impl ChaosStore {
    pub fn new(inner: Arc<MemoryStore>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            commits_seen: Arc::new(AtomicU64::new(0)),
            fail_commit_at: Arc::new(Mutex::new(HashSet::new())),
            fail_aborts: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Fails the `n`th commit issued through this store (1-based).
    pub fn fail_nth_commit(&self, n: u64) {
        self.fail_commit_at.lock().unwrap().insert(n);
    }

    /// Fails the next `n` aborts.
    pub fn fail_aborts(&self, n: u64) {
        self.fail_aborts.store(n, AtomicOrdering::SeqCst);
    }
}

#[async_trait]
impl Store for ChaosStore {
    async fn pending_outboxes(&self, limit: usize) -> Result<Vec<OutboxId>, StoreError> {
        self.inner.pending_outboxes(limit).await
    }

    async fn begin(
        &self,
        opts: TxOptions,
        ctx: &CancellationToken,
    ) -> Result<Box<dyn StoreSession>, StoreError> {
        let inner = self.inner.begin(opts, ctx).await?;
        Ok(Box::new(ChaosSession {
            inner: Some(inner),
            commits_seen: Arc::clone(&self.commits_seen),
            fail_commit_at: Arc::clone(&self.fail_commit_at),
            fail_aborts: Arc::clone(&self.fail_aborts),
        }))
    }

    fn retries_attempts(&self) -> bool {
        self.inner.retries_attempts()
    }
}

struct ChaosSession {
    inner: Option<Box<dyn StoreSession>>,
    commits_seen: Arc<AtomicU64>,
    fail_commit_at: Arc<Mutex<HashSet<u64>>>,
    fail_aborts: Arc<AtomicU64>,
}

impl ChaosSession {
    fn inner(&mut self) -> &mut Box<dyn StoreSession> {
        self.inner.as_mut().expect("session already finished")
    }
}

#[async_trait]
impl StoreSession for ChaosSession {
    async fn lock_state(
        &mut self,
        outbox: OutboxId,
    ) -> Result<Option<crate::OutboxState>, StoreError> {
        self.inner().lock_state(outbox).await
    }

    async fn insert_state(&mut self, state: &crate::OutboxState) -> Result<(), StoreError> {
        self.inner().insert_state(state).await
    }

    async fn replace_state(&mut self, state: &crate::OutboxState) -> Result<(), StoreError> {
        self.inner().replace_state(state).await
    }

    async fn pending_messages(
        &mut self,
        outbox: OutboxId,
        after: u64,
        limit: usize,
    ) -> Result<Vec<OutboxMessage>, StoreError> {
        self.inner().pending_messages(outbox, after, limit).await
    }

    async fn delete_message(&mut self, message: crate::MessageId) -> Result<(), StoreError> {
        self.inner().delete_message(message).await
    }

    async fn purge_outbox(&mut self, outbox: OutboxId) -> Result<u64, StoreError> {
        self.inner().purge_outbox(outbox).await
    }

    async fn commit(mut self: Box<Self>) -> Result<(), StoreError> {
        let inner = self.inner.take().expect("session already finished");
        let index = self.commits_seen.fetch_add(1, AtomicOrdering::SeqCst) + 1;
        if self.fail_commit_at.lock().unwrap().remove(&index) {
            let _ = inner.abort().await;
            return Err(StoreError::backend("injected commit failure"));
        }
        inner.commit().await
    }

    async fn abort(mut self: Box<Self>) -> Result<(), StoreError> {
        let inner = self.inner.take().expect("session already finished");
        let res = inner.abort().await;
        let pending = self.fail_aborts.load(AtomicOrdering::SeqCst);
        if pending > 0 {
            self.fail_aborts.store(pending - 1, AtomicOrdering::SeqCst);
            return Err(StoreError::backend("injected abort failure"));
        }
        res
    }
}

/// Bundles the pieces a scenario needs to drive workers and attempts.
pub struct Rig {
    pub mem: Arc<MemoryStore>,
    pub store: StoreRef,
    pub transport: Arc<MockTransport>,
    pub cfg: RelayConfig,
    pub bus: Bus,
}

impl Rig {
    /// Lease-token (document style) rig.
    pub fn lease() -> Self {
        Self::with_strategy(LockStrategy::LeaseToken)
    }

    /// Row-lock (relational style) rig.
    pub fn row_lock() -> Self {
        Self::with_strategy(LockStrategy::RowLock)
    }

    fn with_strategy(strategy: LockStrategy) -> Self {
        let mem = Arc::new(MemoryStore::new(strategy));
        let store: StoreRef = Arc::clone(&mem) as StoreRef;
        Self {
            mem,
            store,
            transport: MockTransport::new(),
            cfg: fast_cfg(),
            bus: Bus::new(256),
        }
    }

    /// Swaps the store for a chaos wrapper over the same tables.
    pub fn with_chaos(mut self) -> (Self, Arc<ChaosStore>) {
        let chaos = ChaosStore::new(Arc::clone(&self.mem));
        self.store = Arc::clone(&chaos) as StoreRef;
        (self, chaos)
    }

    /// Builds a worker over this rig's adapters.
    pub fn worker(&self) -> DeliveryWorker {
        DeliveryWorker {
            store: Arc::clone(&self.store),
            transport: Arc::clone(&self.transport) as TransportRef,
            cfg: self.cfg.clone(),
            bus: self.bus.clone(),
            semaphore: None,
        }
    }

    /// Runs one worker to completion with a fresh token.
    pub async fn run_worker(&self, outbox: OutboxId) -> WorkerExit {
        self.worker().run(outbox, CancellationToken::new()).await
    }

    /// Runs a single transactional attempt.
    pub async fn attempt(&self, outbox: OutboxId) -> Result<Attempt, StoreError> {
        let transport: TransportRef = Arc::clone(&self.transport) as TransportRef;
        run_attempt(
            &self.store,
            &transport,
            outbox,
            &self.cfg,
            &self.bus,
            &CancellationToken::new(),
        )
        .await
    }

    /// Seeds `n` well-formed messages with sequence numbers `1..=n`.
    pub fn seed(&self, outbox: OutboxId, n: u64) {
        for seq in 1..=n {
            self.mem.enqueue(message(outbox, seq));
        }
    }
}

/// Builds one well-formed message row.
pub fn message(outbox: OutboxId, seq: u64) -> OutboxMessage {
    OutboxMessage::new(
        outbox,
        seq,
        DEST,
        MessageBody::new(format!("payload-{seq}").into_bytes()),
    )
}

/// Builds a row without a destination address.
pub fn malformed_message(outbox: OutboxId, seq: u64) -> OutboxMessage {
    let mut row = message(outbox, seq);
    row.destination_address = None;
    row
}

/// Configuration tuned for fast tests: short delays, no jitter.
pub fn fast_cfg() -> RelayConfig {
    let mut cfg = RelayConfig::default();
    cfg.query_delay = Duration::from_millis(10);
    cfg.query_timeout = Duration::from_secs(2);
    cfg.message_delivery_timeout = Duration::from_millis(200);
    cfg.lock_backoff.first = Duration::from_millis(5);
    cfg.lock_backoff.max = Duration::from_millis(20);
    cfg.lock_backoff.jitter = JitterPolicy::None;
    cfg
}

/// Drains every buffered event from a broadcast receiver.
pub fn collect_events(rx: &mut tokio::sync::broadcast::Receiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        events.push(ev);
    }
    events
}

/// Polls until `pred` holds or the deadline passes; panics on timeout.
pub async fn wait_until(deadline: Duration, mut pred: impl FnMut() -> bool) {
    let start = tokio::time::Instant::now();
    while !pred() {
        if start.elapsed() > deadline {
            panic!("condition not reached within {deadline:?}");
        }
        sleep(Duration::from_millis(5)).await;
    }
}
