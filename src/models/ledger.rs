use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{Id, Symbol};

/// One buy in a user's ledger. Append-only; never edited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerTransaction {
    pub id: Id,
    pub user_id: Id,
    pub symbol: Symbol,
    /// Quantity bought, always positive.
    pub amount: Decimal,
    pub buy_price: Decimal,
    pub transaction_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl LedgerTransaction {
    /// `amount * buy_price`, or `None` when the product is not representable.
    pub fn total_cost(&self) -> Option<Decimal> {
        self.amount.checked_mul(self.buy_price)
    }
}

/// Request to add a buy. Without `price` the current market price is used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuyOrder {
    pub symbol: Symbol,
    pub amount: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<Decimal>,
    #[serde(
        default,
        alias = "transactionDate",
        skip_serializing_if = "Option::is_none"
    )]
    pub transaction_date: Option<DateTime<Utc>>,
}
