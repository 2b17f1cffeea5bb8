use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use anyhow::{anyhow, Result};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::market_data::PriceEvent;
use crate::models::{IdGenerator, UuidIdGenerator};
use crate::shutdown::ShutdownSignal;

use super::{DeliveryStats, Envelope, EventChannel, EventHandler, EventJournal, RetryPolicy};

/// An envelope that exhausted its attempts.
#[derive(Debug, Clone)]
pub struct DeadLetter {
    pub envelope: Envelope,
    pub error: String,
}

#[derive(Default)]
struct Counters {
    delivered: AtomicU64,
    redelivered: AtomicU64,
    dead_lettered: AtomicU64,
}

struct Inner {
    tx: mpsc::Sender<Envelope>,
    rx: Mutex<mpsc::Receiver<Envelope>>,
    policy: RetryPolicy,
    journal: Option<EventJournal>,
    ids: Arc<dyn IdGenerator>,
    counters: Counters,
    dead_letters: StdMutex<Vec<DeadLetter>>,
}

/// In-process work queue: every subscriber competes for the same envelopes.
#[derive(Clone)]
pub struct LocalEventChannel {
    inner: Arc<Inner>,
}

impl LocalEventChannel {
    pub fn new(capacity: usize, policy: RetryPolicy) -> Self {
        Self::build(capacity, policy, None, Arc::new(UuidIdGenerator))
    }

    /// Same as [`LocalEventChannel::new`], backed by a journal for restart recovery.
    pub fn with_journal(capacity: usize, policy: RetryPolicy, journal: EventJournal) -> Self {
        Self::build(capacity, policy, Some(journal), Arc::new(UuidIdGenerator))
    }

    pub fn build(
        capacity: usize,
        policy: RetryPolicy,
        journal: Option<EventJournal>,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self {
            inner: Arc::new(Inner {
                tx,
                rx: Mutex::new(rx),
                policy,
                journal,
                ids,
                counters: Counters::default(),
                dead_letters: StdMutex::new(Vec::new()),
            }),
        }
    }

    /// Re-enqueue everything the journal holds that was never acked.
    ///
    /// Call once at startup. The envelopes are fed to the queue from a
    /// background task, so more pending envelopes than the queue holds only
    /// wait for subscribers instead of blocking the caller. Returns the number
    /// of envelopes recovered.
    pub async fn recover(&self) -> Result<usize> {
        let Some(journal) = &self.inner.journal else {
            return Ok(0);
        };
        let pending = journal.compact().await?;
        let count = pending.len();
        if count == 0 {
            return Ok(0);
        }

        info!(count, "re-enqueuing unacknowledged events");
        let tx = self.inner.tx.clone();
        tokio::spawn(async move {
            for envelope in pending {
                if tx.send(envelope).await.is_err() {
                    warn!("event channel closed during recovery");
                    return;
                }
            }
            debug!(count, "recovered events enqueued");
        });
        Ok(count)
    }

    pub fn delivery_stats(&self) -> DeliveryStats {
        let c = &self.inner.counters;
        DeliveryStats {
            delivered: c.delivered.load(Ordering::Relaxed),
            redelivered: c.redelivered.load(Ordering::Relaxed),
            dead_lettered: c.dead_lettered.load(Ordering::Relaxed),
        }
    }

    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.inner
            .dead_letters
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Envelopes waiting in the queue right now.
    pub fn queued(&self) -> usize {
        self.inner.tx.max_capacity() - self.inner.tx.capacity()
    }
}

impl Inner {
    async fn ack(&self, envelope: &Envelope) {
        if let Some(journal) = &self.journal {
            // A lost ack only means one extra delivery after restart.
            if let Err(e) = journal.record_ack(&envelope.id).await {
                warn!(envelope = %envelope.id, error = %e, "failed to journal ack");
            }
        }
    }

    async fn deliver(&self, handler: &dyn EventHandler, envelope: Envelope) {
        let symbol = envelope.event.symbol.clone();
        match handler.handle(&envelope.event).await {
            Ok(()) => {
                debug!(envelope = %envelope.id, symbol = %symbol, attempt = envelope.attempt, "event handled");
                self.ack(&envelope).await;
                self.counters.delivered.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) if self.policy.exhausted(envelope.attempt) => {
                error!(
                    envelope = %envelope.id,
                    symbol = %symbol,
                    attempts = envelope.attempt,
                    error = %e,
                    "event dead-lettered"
                );
                self.ack(&envelope).await;
                self.dead_letters
                    .lock()
                    .unwrap_or_else(|p| p.into_inner())
                    .push(DeadLetter {
                        envelope,
                        error: format!("{e:#}"),
                    });
                self.counters.dead_lettered.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                self.counters.redelivered.fetch_add(1, Ordering::Relaxed);
                let delay = self.policy.delay(envelope.attempt);
                warn!(
                    envelope = %envelope.id,
                    symbol = %symbol,
                    attempt = envelope.attempt,
                    retry_in_ms = delay.as_millis() as u64,
                    error = %e,
                    "event handling failed; scheduling redelivery"
                );
                let retry = Envelope {
                    attempt: envelope.attempt + 1,
                    ..envelope
                };
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    if tx.send(retry).await.is_err() {
                        warn!("event channel closed before redelivery");
                    }
                });
            }
        }
    }
}

#[async_trait::async_trait]
impl EventChannel for LocalEventChannel {
    async fn publish(&self, event: PriceEvent) -> Result<()> {
        let envelope = Envelope::new(self.inner.ids.new_id(), event);
        if let Some(journal) = &self.inner.journal {
            journal.record_published(&envelope).await?;
        }
        self.inner
            .tx
            .send(envelope)
            .await
            .map_err(|_| anyhow!("event channel closed"))
    }

    fn subscribe(&self, handler: Arc<dyn EventHandler>, mut shutdown: ShutdownSignal) -> JoinHandle<()> {
        let inner = self.inner.clone();
        tokio::spawn(async move {
            loop {
                let next = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    envelope = async { inner.rx.lock().await.recv().await } => envelope,
                };
                let Some(envelope) = next else {
                    break;
                };
                // Not raced against shutdown: an in-flight delivery always completes.
                inner.deliver(handler.as_ref(), envelope).await;
            }
            debug!("event subscriber stopped");
        })
    }
}
