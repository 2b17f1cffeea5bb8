use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pricepulse::market_data::{PriceCache, PriceEvent, PriceRecord, SearchIndex};
use pricepulse::models::Symbol;
use pricepulse::storage::{MemoryStorage, PriceStore};
use rust_decimal::Decimal;

pub fn dec(s: &str) -> Decimal {
    s.parse().expect("valid decimal literal")
}

pub fn symbol(s: &str) -> Symbol {
    Symbol::parse(s).expect("valid symbol")
}

pub fn event(sym: &str, price: &str, at: DateTime<Utc>) -> PriceEvent {
    PriceEvent::new(symbol(sym), dec(price), at).expect("positive price")
}

pub async fn wait_until(mut done: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !done() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

/// Store whose first `failures` appends fail; later appends reach the inner store.
pub struct FlakyStore {
    pub inner: Arc<MemoryStorage>,
    failures_left: AtomicU32,
    pub attempts: AtomicU32,
}

impl FlakyStore {
    pub fn new(failures: u32) -> Self {
        Self {
            inner: Arc::new(MemoryStorage::new()),
            failures_left: AtomicU32::new(failures),
            attempts: AtomicU32::new(0),
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PriceStore for FlakyStore {
    async fn append_price(&self, record: &PriceRecord) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let left = self.failures_left.load(Ordering::SeqCst);
        if left > 0 {
            self.failures_left.store(left - 1, Ordering::SeqCst);
            anyhow::bail!("store connection reset");
        }
        self.inner.append_price(record).await
    }

    async fn latest_price(&self, symbol: &Symbol) -> Result<Option<PriceRecord>> {
        self.inner.latest_price(symbol).await
    }

    async fn count_prices(&self) -> Result<u64> {
        self.inner.count_prices().await
    }
}

/// Search index that is always down.
pub struct DownSearchIndex;

#[async_trait]
impl SearchIndex for DownSearchIndex {
    async fn index_price(&self, _record: &PriceRecord) -> Result<()> {
        anyhow::bail!("search cluster unreachable")
    }

    async fn search(
        &self,
        _symbol: &Symbol,
        _from: DateTime<Utc>,
        _to: DateTime<Utc>,
        _limit: usize,
    ) -> Result<Vec<PriceRecord>> {
        anyhow::bail!("search cluster unreachable")
    }
}

/// Cache that rejects every call.
pub struct DownCache;

#[async_trait]
impl PriceCache for DownCache {
    async fn get(&self, _symbol: &Symbol) -> Result<Option<PriceRecord>> {
        anyhow::bail!("cache unreachable")
    }

    async fn put(&self, _record: &PriceRecord, _ttl: Duration) -> Result<()> {
        anyhow::bail!("cache unreachable")
    }
}
