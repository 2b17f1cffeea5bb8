mod support;

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use pricepulse::fanout::FanOutConsumer;
use pricepulse::market_data::{MemoryPriceCache, MemorySearchIndex, PriceService};
use pricepulse::models::{BuyOrder, Id, SequentialIdGenerator};
use pricepulse::portfolio::{PortfolioError, PortfolioService};
use pricepulse::storage::{JsonlStorage, LedgerStore};
use support::{dec, event, symbol};
use tempfile::TempDir;

fn order(sym: &str, amount: &str, price: Option<&str>) -> BuyOrder {
    BuyOrder {
        symbol: symbol(sym),
        amount: dec(amount),
        price: price.map(dec),
        transaction_date: None,
    }
}

struct Setup {
    _dir: TempDir,
    storage: Arc<JsonlStorage>,
    consumer: FanOutConsumer,
    portfolio: PortfolioService,
}

fn setup() -> Result<Setup> {
    let dir = TempDir::new()?;
    let storage = Arc::new(JsonlStorage::new(dir.path()));
    let cache = Arc::new(MemoryPriceCache::new());
    let search = Arc::new(MemorySearchIndex::new());
    let consumer = FanOutConsumer::new(storage.clone(), cache.clone(), search.clone());
    let prices = Arc::new(PriceService::new(storage.clone(), cache, search));
    let portfolio = PortfolioService::new(storage.clone(), prices)
        .with_id_generator(Arc::new(SequentialIdGenerator::new("tx")));
    Ok(Setup {
        _dir: dir,
        storage,
        consumer,
        portfolio,
    })
}

#[tokio::test]
async fn two_btc_buys_valued_at_market() -> Result<()> {
    let s = setup()?;
    let user = Id::from("alice");

    s.portfolio.buy(&user, order("BTC", "1.0", Some("50000"))).await?;
    s.portfolio.buy(&user, order("BTC", "1.0", Some("60000"))).await?;
    s.consumer.consume(&event("BTC", "70000", Utc::now())).await?;

    let positions = s.portfolio.positions(&user).await?;
    assert_eq!(positions.len(), 1);
    let btc = &positions[0];
    assert_eq!(btc.total_amount, dec("2.0"));
    assert_eq!(btc.average_cost, dec("55000"));
    assert_eq!(btc.current_price, dec("70000"));
    assert_eq!(btc.current_value, dec("140000"));
    assert_eq!(btc.profit_loss, dec("30000"));
    assert_eq!(btc.profit_loss_percentage.round_dp(2), dec("27.27"));
    Ok(())
}

#[tokio::test]
async fn average_cost_does_not_depend_on_buy_order() -> Result<()> {
    let buys = [("0.5", "40000"), ("1.5", "42000"), ("0.25", "39000")];
    let mut averages = Vec::new();

    for reversed in [false, true] {
        let s = setup()?;
        let user = Id::from("carol");
        let mut sequence: Vec<_> = buys.to_vec();
        if reversed {
            sequence.reverse();
        }
        for (amount, price) in sequence {
            s.portfolio.buy(&user, order("BTC", amount, Some(price))).await?;
        }
        let positions = s.portfolio.positions(&user).await?;
        averages.push(positions[0].average_cost);
    }

    // (0.5·40000 + 1.5·42000 + 0.25·39000) / 2.25
    let expected = dec("92750") / dec("2.25");
    assert_eq!(averages, vec![expected, expected]);
    Ok(())
}

#[tokio::test]
async fn buy_without_price_uses_latest_market_price() -> Result<()> {
    let s = setup()?;
    let user = Id::from("dave");
    s.consumer.consume(&event("ETH", "3000", Utc::now())).await?;

    let tx = s.portfolio.buy(&user, order("ETH", "2", None)).await?;
    assert_eq!(tx.buy_price, dec("3000"));
    assert_eq!(tx.id.as_str(), "tx-1");

    let ledger = s.storage.transactions_for_user(&user).await?;
    assert_eq!(ledger, vec![tx]);
    Ok(())
}

#[tokio::test]
async fn buy_without_any_price_data_is_rejected() -> Result<()> {
    let s = setup()?;
    let user = Id::from("erin");

    let err = s
        .portfolio
        .buy(&user, order("DOGE", "100", None))
        .await
        .unwrap_err();
    assert!(matches!(err, PortfolioError::NoPriceData { ref symbol } if symbol.as_str() == "DOGE"));
    assert!(s.storage.transactions_for_user(&user).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn positions_without_market_data_read_as_break_even() -> Result<()> {
    let s = setup()?;
    let user = Id::from("frank");
    s.portfolio.buy(&user, order("XAG", "10", Some("24.5"))).await?;

    let positions = s.portfolio.positions(&user).await?;
    let xag = &positions[0];
    assert_eq!(xag.current_price, dec("24.5"));
    assert_eq!(xag.profit_loss, dec("0"));
    assert_eq!(xag.profit_loss_percentage, dec("0"));
    Ok(())
}
