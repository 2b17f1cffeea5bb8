// src/portfolio/service.rs
use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::info;

use crate::clock::{Clock, SystemClock};
use crate::market_data::PriceService;
use crate::models::{BuyOrder, Id, IdGenerator, LedgerTransaction, Symbol, UuidIdGenerator};
use crate::storage::LedgerStore;

use super::{aggregate_holdings, value_holding, PortfolioPosition, ValueOverflow};

/// Rejections surfaced to the caller as-is; none of these are retried.
#[derive(Debug, thiserror::Error)]
pub enum PortfolioError {
    #[error("amount must be greater than zero")]
    InvalidAmount,
    #[error("price must be greater than zero")]
    InvalidPrice,
    #[error("missing user identity")]
    MissingUser,
    #[error("no price data for {symbol}")]
    NoPriceData { symbol: Symbol },
    /// The buy would push the user's totals for the symbol out of range.
    #[error("order for {symbol} is too large")]
    OrderTooLarge { symbol: Symbol },
    #[error(transparent)]
    Valuation(#[from] ValueOverflow),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

pub struct PortfolioService {
    ledger: Arc<dyn LedgerStore>,
    prices: Arc<PriceService>,
    ids: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
}

impl PortfolioService {
    pub fn new(ledger: Arc<dyn LedgerStore>, prices: Arc<PriceService>) -> Self {
        Self {
            ledger,
            prices,
            ids: Arc::new(UuidIdGenerator),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    async fn market_price(&self, symbol: &Symbol) -> Result<Option<Decimal>, PortfolioError> {
        Ok(self
            .prices
            .latest_price(symbol)
            .await?
            .map(|latest| latest.data.price))
    }

    /// Record a buy. Without an explicit price the latest known market price
    /// is used, and the buy is rejected when there is none.
    pub async fn buy(&self, user_id: &Id, order: BuyOrder) -> Result<LedgerTransaction, PortfolioError> {
        if user_id.as_str().trim().is_empty() {
            return Err(PortfolioError::MissingUser);
        }
        if order.amount <= Decimal::ZERO {
            return Err(PortfolioError::InvalidAmount);
        }

        let buy_price = match order.price {
            Some(price) if price <= Decimal::ZERO => return Err(PortfolioError::InvalidPrice),
            Some(price) => price,
            None => self
                .market_price(&order.symbol)
                .await?
                .ok_or_else(|| PortfolioError::NoPriceData {
                    symbol: order.symbol.clone(),
                })?,
        };

        let now = self.clock.now();
        let tx = LedgerTransaction {
            id: self.ids.new_id(),
            user_id: user_id.clone(),
            symbol: order.symbol,
            amount: order.amount,
            buy_price,
            transaction_date: order.transaction_date.unwrap_or(now),
            created_at: now,
        };

        let mut ledger = self.ledger.transactions_for_user(user_id).await?;
        ledger.push(tx.clone());
        if let Err(ValueOverflow { symbol }) = aggregate_holdings(&ledger) {
            return Err(PortfolioError::OrderTooLarge { symbol });
        }
        self.ledger.append_transaction(&tx).await?;

        info!(
            user = %tx.user_id,
            symbol = %tx.symbol,
            amount = %tx.amount,
            price = %tx.buy_price,
            "recorded buy"
        );
        Ok(tx)
    }

    /// Current positions for `user_id`, one per symbol held.
    pub async fn positions(&self, user_id: &Id) -> Result<Vec<PortfolioPosition>, PortfolioError> {
        if user_id.as_str().trim().is_empty() {
            return Err(PortfolioError::MissingUser);
        }

        let transactions = self.ledger.transactions_for_user(user_id).await?;
        let mut positions = Vec::new();
        for holding in aggregate_holdings(&transactions)? {
            let price = self.market_price(&holding.symbol).await?;
            positions.push(value_holding(&holding, price)?);
        }
        Ok(positions)
    }
}
