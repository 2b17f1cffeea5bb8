use anyhow::Result;
use rust_decimal::Decimal;

use crate::models::Symbol;

/// External quote provider polled by the market poller.
#[async_trait::async_trait]
pub trait QuoteSource: Send + Sync {
    fn name(&self) -> &str;

    /// Provider identifier for an internal symbol, or `None` when the provider
    /// cannot quote it. Must not perform I/O.
    fn provider_symbol(&self, symbol: &Symbol) -> Option<String>;

    /// Latest price for a provider identifier. `Ok(None)` means the provider
    /// answered but had no usable price.
    async fn fetch_price(&self, provider_symbol: &str) -> Result<Option<Decimal>>;
}
