//! Authoritative storage: append-only price history and per-user buy ledgers.

mod jsonl;
mod memory;

pub(crate) use jsonl::ends_with_newline;
pub use jsonl::JsonlStorage;
pub use memory::MemoryStorage;

use anyhow::Result;

use crate::market_data::PriceRecord;
use crate::models::{Id, LedgerTransaction, Symbol};

/// System of record for price history.
#[async_trait::async_trait]
pub trait PriceStore: Send + Sync {
    /// Append one record. Either the whole record is persisted or nothing is.
    async fn append_price(&self, record: &PriceRecord) -> Result<()>;

    /// The record with the greatest `observed_at` for `symbol`.
    async fn latest_price(&self, symbol: &Symbol) -> Result<Option<PriceRecord>>;

    async fn count_prices(&self) -> Result<u64>;
}

#[async_trait::async_trait]
pub trait LedgerStore: Send + Sync {
    async fn append_transaction(&self, tx: &LedgerTransaction) -> Result<()>;

    /// All ledger entries for `user_id` in append order.
    async fn transactions_for_user(&self, user_id: &Id) -> Result<Vec<LedgerTransaction>>;
}
