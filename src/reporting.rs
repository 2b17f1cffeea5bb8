//! Periodic market report: logs how many price records the store holds.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::shutdown::ShutdownSignal;
use crate::storage::PriceStore;

pub async fn report_once(store: &dyn PriceStore) -> Result<u64> {
    let count = store.count_prices().await?;
    info!(price_records = count, "market report");
    Ok(count)
}

/// Report every `interval` until shutdown. The first report runs immediately.
pub async fn run_market_report(store: Arc<dyn PriceStore>, interval: Duration, mut shutdown: ShutdownSignal) {
    let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                if let Err(e) = report_once(store.as_ref()).await {
                    warn!(error = %e, "market report failed");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market_data::PriceRecord;
    use crate::models::{Id, Symbol};
    use crate::shutdown;
    use crate::storage::MemoryStorage;
    use chrono::Utc;
    use rust_decimal::Decimal;

    #[tokio::test]
    async fn report_counts_every_record() -> Result<()> {
        let store = MemoryStorage::new();
        for symbol in ["BTC", "ETH", "BTC"] {
            let now = Utc::now();
            store
                .append_price(&PriceRecord {
                    id: Id::new(),
                    symbol: Symbol::parse(symbol)?,
                    price: Decimal::ONE,
                    observed_at: now,
                    recorded_at: now,
                })
                .await?;
        }
        assert_eq!(report_once(&store).await?, 3);
        Ok(())
    }

    #[tokio::test]
    async fn report_loop_exits_on_shutdown() {
        let (trigger, signal) = shutdown::channel();
        let task = tokio::spawn(run_market_report(
            Arc::new(MemoryStorage::new()),
            Duration::from_secs(60),
            signal,
        ));
        trigger.trigger();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("report loop should stop")
            .expect("report loop should not panic");
    }
}
