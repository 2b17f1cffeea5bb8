//! Time-range search over price history.

use std::collections::{BTreeMap, HashMap};

use anyhow::Result;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::models::{Id, Symbol};

use super::PriceRecord;

#[async_trait::async_trait]
pub trait SearchIndex: Send + Sync {
    async fn index_price(&self, record: &PriceRecord) -> Result<()>;

    /// Records for `symbol` with `from <= observed_at <= to`, newest first, at most `limit`.
    async fn search(
        &self,
        symbol: &Symbol,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<PriceRecord>>;
}

/// Ordered per-symbol index held in memory.
#[derive(Default)]
pub struct MemorySearchIndex {
    // Keyed by (observed_at, id) so equal timestamps do not collide and
    // re-indexing the same record replaces it.
    docs: RwLock<HashMap<Symbol, BTreeMap<(DateTime<Utc>, Id), PriceRecord>>>,
}

impl MemorySearchIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl SearchIndex for MemorySearchIndex {
    async fn index_price(&self, record: &PriceRecord) -> Result<()> {
        let mut docs = self.docs.write().await;
        docs.entry(record.symbol.clone())
            .or_default()
            .insert((record.observed_at, record.id.clone()), record.clone());
        Ok(())
    }

    async fn search(
        &self,
        symbol: &Symbol,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<PriceRecord>> {
        if from > to {
            return Ok(Vec::new());
        }
        let docs = self.docs.read().await;
        let Some(series) = docs.get(symbol) else {
            return Ok(Vec::new());
        };
        Ok(series
            .values()
            .rev()
            .filter(|r| r.observed_at >= from && r.observed_at <= to)
            .take(limit)
            .cloned()
            .collect())
    }
}
