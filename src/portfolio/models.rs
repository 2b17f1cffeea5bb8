// src/portfolio/models.rs
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::Symbol;

/// Ledger totals for one symbol, before any price is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Holding {
    pub symbol: Symbol,
    pub total_amount: Decimal,
    /// Σ amount·buy_price
    pub total_cost: Decimal,
}

impl Holding {
    pub fn average_cost(&self) -> Option<Decimal> {
        if self.total_amount.is_zero() {
            Some(Decimal::ZERO)
        } else {
            self.total_cost.checked_div(self.total_amount)
        }
    }
}

/// Derived per-symbol view of a user's ledger. Recomputed on every read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortfolioPosition {
    pub symbol: Symbol,
    pub total_amount: Decimal,
    pub average_cost: Decimal,
    pub current_price: Decimal,
    pub current_value: Decimal,
    pub profit_loss: Decimal,
    pub profit_loss_percentage: Decimal,
}
