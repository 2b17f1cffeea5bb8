//! Latest-price lookaside cache.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::clock::{Clock, SystemClock};
use crate::models::Symbol;

use super::PriceRecord;

/// Cache key for a symbol's latest price.
pub fn cache_key(symbol: &Symbol) -> String {
    format!("price:{symbol}")
}

#[async_trait::async_trait]
pub trait PriceCache: Send + Sync {
    /// Unexpired entry for `symbol`, if any.
    async fn get(&self, symbol: &Symbol) -> Result<Option<PriceRecord>>;

    /// Overwrite the entry for `record.symbol`. Last writer wins.
    async fn put(&self, record: &PriceRecord, ttl: Duration) -> Result<()>;
}

#[derive(Debug, Clone)]
struct CacheEntry {
    record: PriceRecord,
    expires_at: DateTime<Utc>,
}

/// Process-local cache with expiry driven by a [`Clock`].
pub struct MemoryPriceCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    clock: Arc<dyn Clock>,
}

impl Default for MemoryPriceCache {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryPriceCache {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Drop every expired entry; returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        before - entries.len()
    }

    /// Number of entries held, including ones that expired but were not evicted yet.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait::async_trait]
impl PriceCache for MemoryPriceCache {
    async fn get(&self, symbol: &Symbol) -> Result<Option<PriceRecord>> {
        let key = cache_key(symbol);
        let now = self.clock.now();
        let mut entries = self.entries.lock().await;
        match entries.get(&key) {
            Some(entry) if entry.expires_at > now => Ok(Some(entry.record.clone())),
            Some(_) => {
                entries.remove(&key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn put(&self, record: &PriceRecord, ttl: Duration) -> Result<()> {
        let ttl = chrono::Duration::from_std(ttl).context("Cache TTL out of range")?;
        let expires_at = self.clock.now() + ttl;
        let mut entries = self.entries.lock().await;
        entries.insert(
            cache_key(&record.symbol),
            CacheEntry {
                record: record.clone(),
                expires_at,
            },
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::models::Id;
    use chrono::TimeZone;
    use rust_decimal::Decimal;

    fn record(symbol: &str, price: i64, at: DateTime<Utc>) -> PriceRecord {
        PriceRecord {
            id: Id::new(),
            symbol: Symbol::parse(symbol).unwrap(),
            price: Decimal::from(price),
            observed_at: at,
            recorded_at: at,
        }
    }

    #[test]
    fn key_is_prefixed_symbol() {
        assert_eq!(cache_key(&Symbol::parse("btc").unwrap()), "price:BTC");
    }

    #[tokio::test]
    async fn entries_expire_after_ttl() -> Result<()> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let cache = MemoryPriceCache::with_clock(clock.clone());
        let eth = record("ETH", 3000, start);

        cache.put(&eth, Duration::from_secs(3600)).await?;
        clock.advance(chrono::Duration::minutes(59));
        assert_eq!(cache.get(&eth.symbol).await?, Some(eth.clone()));

        clock.advance(chrono::Duration::minutes(1));
        assert_eq!(cache.get(&eth.symbol).await?, None);
        assert!(cache.is_empty().await, "expired entry is evicted on read");
        Ok(())
    }

    #[tokio::test]
    async fn put_overwrites_and_purge_drops_expired() -> Result<()> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let cache = MemoryPriceCache::with_clock(clock.clone());

        cache.put(&record("BTC", 1, start), Duration::from_secs(60)).await?;
        let newer = record("BTC", 2, start);
        cache.put(&newer, Duration::from_secs(60)).await?;
        cache.put(&record("SOL", 3, start), Duration::from_secs(10)).await?;

        assert_eq!(cache.get(&newer.symbol).await?, Some(newer));
        clock.advance(chrono::Duration::seconds(30));
        assert_eq!(cache.purge_expired().await, 1);
        assert_eq!(cache.len().await, 1);
        Ok(())
    }
}
