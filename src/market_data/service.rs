use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::clock::{Clock, SystemClock};
use crate::models::Symbol;
use crate::storage::PriceStore;
use crate::timeout::with_timeout;

use super::{LatestPrice, PriceCache, PriceHistory, PriceSource, SearchIndex};

pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60 * 60);
pub const DEFAULT_HISTORY_LIMIT: usize = 1000;
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Read paths over the three sinks: cache-aside for the latest price,
/// search index for history.
pub struct PriceService {
    store: Arc<dyn PriceStore>,
    cache: Arc<dyn PriceCache>,
    search: Arc<dyn SearchIndex>,
    cache_ttl: Duration,
    history_limit: usize,
    read_timeout: Duration,
    clock: Arc<dyn Clock>,
}

impl PriceService {
    pub fn new(
        store: Arc<dyn PriceStore>,
        cache: Arc<dyn PriceCache>,
        search: Arc<dyn SearchIndex>,
    ) -> Self {
        Self {
            store,
            cache,
            search,
            cache_ttl: DEFAULT_CACHE_TTL,
            history_limit: DEFAULT_HISTORY_LIMIT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    /// Upper bound for each cache, store and index call.
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Cache first, then the store (warming the cache), otherwise `None`.
    ///
    /// Misses are never cached; only store failures surface as errors.
    pub async fn latest_price(&self, symbol: &Symbol) -> Result<Option<LatestPrice>> {
        match with_timeout(self.read_timeout, "cache", self.cache.get(symbol)).await {
            Ok(Some(record)) => {
                debug!(symbol = %symbol, "latest price served from cache");
                return Ok(Some(LatestPrice {
                    source: PriceSource::Cache,
                    data: record,
                }));
            }
            Ok(None) => {}
            Err(e) => warn!(symbol = %symbol, error = %e, "cache read failed; falling back to store"),
        }

        let Some(record) =
            with_timeout(self.read_timeout, "store", self.store.latest_price(symbol)).await?
        else {
            debug!(symbol = %symbol, "no price data");
            return Ok(None);
        };

        if let Err(e) = with_timeout(
            self.read_timeout,
            "cache",
            self.cache.put(&record, self.cache_ttl),
        )
        .await
        {
            warn!(symbol = %symbol, error = %e, "failed to warm cache");
        }
        Ok(Some(LatestPrice {
            source: PriceSource::Store,
            data: record,
        }))
    }

    /// Indexed records in `[from, to]`, newest first. An unavailable index
    /// yields an empty history rather than an error.
    pub async fn history(
        &self,
        symbol: &Symbol,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<PriceHistory> {
        let records = match with_timeout(
            self.read_timeout,
            "search",
            self.search.search(symbol, from, to, self.history_limit),
        )
        .await
        {
            Ok(records) => records,
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "history query failed; returning empty history");
                Vec::new()
            }
        };
        Ok(PriceHistory::from_records(records))
    }

    /// History for the trailing `hours` ending now. Windows reaching past the
    /// earliest representable instant start there.
    pub async fn history_for_window(&self, symbol: &Symbol, hours: u32) -> Result<PriceHistory> {
        let to = self.clock.now();
        let from = to
            .checked_sub_signed(chrono::Duration::hours(i64::from(hours)))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        self.history(symbol, from, to).await
    }
}
