//! Commits each price event to the store, cache and search index.
//!
//! The store write decides the outcome of a delivery. The cache write happens
//! only after the store succeeded and can fail without consequence, as can
//! indexing. Each sink call carries its own timeout.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, error, warn};

use crate::channel::EventHandler;
use crate::clock::{Clock, SystemClock};
use crate::market_data::{PriceCache, PriceEvent, PriceNotification, PriceRecord, SearchIndex, DEFAULT_CACHE_TTL};
use crate::models::{IdGenerator, UuidIdGenerator};
use crate::notify::PriceNotifier;
use crate::storage::PriceStore;
use crate::timeout::with_timeout;

pub const DEFAULT_SINK_TIMEOUT: Duration = Duration::from_secs(5);

pub struct FanOutConsumer {
    store: Arc<dyn PriceStore>,
    cache: Arc<dyn PriceCache>,
    search: Arc<dyn SearchIndex>,
    notifier: Option<PriceNotifier>,
    ids: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
    cache_ttl: Duration,
    sink_timeout: Duration,
}

impl FanOutConsumer {
    pub fn new(
        store: Arc<dyn PriceStore>,
        cache: Arc<dyn PriceCache>,
        search: Arc<dyn SearchIndex>,
    ) -> Self {
        Self {
            store,
            cache,
            search,
            notifier: None,
            ids: Arc::new(UuidIdGenerator),
            clock: Arc::new(SystemClock),
            cache_ttl: DEFAULT_CACHE_TTL,
            sink_timeout: DEFAULT_SINK_TIMEOUT,
        }
    }

    pub fn with_notifier(mut self, notifier: PriceNotifier) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn with_sink_timeout(mut self, timeout: Duration) -> Self {
        self.sink_timeout = timeout;
        self
    }

    /// Persist `event` and propagate it to the secondary sinks.
    ///
    /// Fails only when the store write fails or times out; the caller is
    /// expected to redeliver in that case.
    pub async fn consume(&self, event: &PriceEvent) -> Result<PriceRecord> {
        let record = PriceRecord::from_event(event, self.ids.new_id(), self.clock.now());
        let symbol = &record.symbol;

        if let Err(e) = with_timeout(self.sink_timeout, "store", self.store.append_price(&record)).await {
            error!(symbol = %symbol, record = %record.id, error = %e, "store write failed");
            return Err(e).context("Failed to persist price record");
        }

        if let Err(e) = with_timeout(self.sink_timeout, "cache", self.cache.put(&record, self.cache_ttl)).await {
            warn!(symbol = %symbol, error = %e, "cache write failed; store remains authoritative");
        }

        if let Err(e) = with_timeout(self.sink_timeout, "search", self.search.index_price(&record)).await {
            warn!(symbol = %symbol, record = %record.id, error = %e, "search indexing failed");
        }

        if let Some(notifier) = &self.notifier {
            notifier.notify(PriceNotification::from(&record));
        }

        debug!(symbol = %symbol, price = %record.price, "price committed");
        Ok(record)
    }
}

#[async_trait::async_trait]
impl EventHandler for FanOutConsumer {
    async fn handle(&self, event: &PriceEvent) -> Result<()> {
        self.consume(event).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market_data::{MemoryPriceCache, MemorySearchIndex};
    use crate::models::{Symbol, SequentialIdGenerator};
    use crate::storage::MemoryStorage;
    use chrono::Utc;
    use rust_decimal::Decimal;

    struct SlowStore;

    #[async_trait::async_trait]
    impl PriceStore for SlowStore {
        async fn append_price(&self, _record: &PriceRecord) -> Result<()> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        }

        async fn latest_price(&self, _symbol: &Symbol) -> Result<Option<PriceRecord>> {
            Ok(None)
        }

        async fn count_prices(&self) -> Result<u64> {
            Ok(0)
        }
    }

    fn event() -> PriceEvent {
        PriceEvent::new(Symbol::parse("BTC").unwrap(), Decimal::from(65_000), Utc::now()).unwrap()
    }

    #[tokio::test]
    async fn commit_reaches_every_sink_and_notifies() -> Result<()> {
        let store = Arc::new(MemoryStorage::new());
        let cache = Arc::new(MemoryPriceCache::new());
        let search = Arc::new(MemorySearchIndex::new());
        let notifier = PriceNotifier::default();
        let mut rx = notifier.subscribe();

        let consumer = FanOutConsumer::new(store.clone(), cache.clone(), search.clone())
            .with_notifier(notifier)
            .with_id_generator(Arc::new(SequentialIdGenerator::new("rec")));

        let ev = event();
        let record = consumer.consume(&ev).await?;
        assert_eq!(record.id.as_str(), "rec-1");
        assert_eq!(store.latest_price(&ev.symbol).await?, Some(record.clone()));
        assert_eq!(cache.get(&ev.symbol).await?, Some(record.clone()));
        let hits = search
            .search(&ev.symbol, ev.observed_at, ev.observed_at, 10)
            .await?;
        assert_eq!(hits, vec![record.clone()]);

        let pushed = rx.recv().await?;
        assert_eq!(pushed.price, ev.price);
        assert_eq!(pushed.timestamp, ev.observed_at);
        Ok(())
    }

    #[tokio::test]
    async fn store_timeout_fails_consume_and_skips_cache() -> Result<()> {
        let cache = Arc::new(MemoryPriceCache::new());
        let consumer = FanOutConsumer::new(
            Arc::new(SlowStore),
            cache.clone(),
            Arc::new(MemorySearchIndex::new()),
        )
        .with_sink_timeout(Duration::from_millis(20));

        let err = consumer.consume(&event()).await.unwrap_err();
        assert!(format!("{err:#}").contains("timed out"));
        assert!(cache.is_empty().await);
        Ok(())
    }
}
