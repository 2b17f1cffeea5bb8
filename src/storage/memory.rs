//! In-memory storage for tests and ephemeral runs.

use std::collections::HashMap;

use anyhow::Result;
use tokio::sync::Mutex;

use crate::market_data::PriceRecord;
use crate::models::{Id, LedgerTransaction, Symbol};

use super::{LedgerStore, PriceStore};

#[derive(Default)]
pub struct MemoryStorage {
    prices: Mutex<HashMap<Symbol, Vec<PriceRecord>>>,
    ledgers: Mutex<HashMap<Id, Vec<LedgerTransaction>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored record for `symbol`, in append order.
    pub async fn prices_for(&self, symbol: &Symbol) -> Vec<PriceRecord> {
        let prices = self.prices.lock().await;
        prices.get(symbol).cloned().unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl PriceStore for MemoryStorage {
    async fn append_price(&self, record: &PriceRecord) -> Result<()> {
        let mut prices = self.prices.lock().await;
        prices
            .entry(record.symbol.clone())
            .or_default()
            .push(record.clone());
        Ok(())
    }

    async fn latest_price(&self, symbol: &Symbol) -> Result<Option<PriceRecord>> {
        let prices = self.prices.lock().await;
        Ok(prices
            .get(symbol)
            .and_then(|records| records.iter().max_by_key(|r| r.observed_at))
            .cloned())
    }

    async fn count_prices(&self) -> Result<u64> {
        let prices = self.prices.lock().await;
        Ok(prices.values().map(|records| records.len() as u64).sum())
    }
}

#[async_trait::async_trait]
impl LedgerStore for MemoryStorage {
    async fn append_transaction(&self, tx: &LedgerTransaction) -> Result<()> {
        let mut ledgers = self.ledgers.lock().await;
        ledgers.entry(tx.user_id.clone()).or_default().push(tx.clone());
        Ok(())
    }

    async fn transactions_for_user(&self, user_id: &Id) -> Result<Vec<LedgerTransaction>> {
        let ledgers = self.ledgers.lock().await;
        Ok(ledgers.get(user_id).cloned().unwrap_or_default())
    }
}
