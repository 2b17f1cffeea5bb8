// src/portfolio/valuation.rs
//! Pure position math over a ledger snapshot.

use std::collections::BTreeMap;

use rust_decimal::Decimal;

use crate::models::{LedgerTransaction, Symbol};

use super::{Holding, PortfolioPosition};

/// A quantity, cost or value that does not fit in a `Decimal`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("value of the {symbol} holding is out of range")]
pub struct ValueOverflow {
    pub symbol: Symbol,
}

/// Group ledger entries per symbol, sorted by symbol.
pub fn aggregate_holdings(transactions: &[LedgerTransaction]) -> Result<Vec<Holding>, ValueOverflow> {
    let mut totals: BTreeMap<&Symbol, (Decimal, Decimal)> = BTreeMap::new();
    for tx in transactions {
        let overflow = || ValueOverflow {
            symbol: tx.symbol.clone(),
        };
        let (amount, cost) = totals.entry(&tx.symbol).or_default();
        *amount = amount.checked_add(tx.amount).ok_or_else(overflow)?;
        let tx_cost = tx.total_cost().ok_or_else(overflow)?;
        *cost = cost.checked_add(tx_cost).ok_or_else(overflow)?;
    }

    Ok(totals
        .into_iter()
        .map(|(symbol, (total_amount, total_cost))| Holding {
            symbol: symbol.clone(),
            total_amount,
            total_cost,
        })
        .collect())
}

/// Value a holding at `current_price`, or at its own average cost when no
/// market price is known (P&L then reads as zero).
pub fn value_holding(
    holding: &Holding,
    current_price: Option<Decimal>,
) -> Result<PortfolioPosition, ValueOverflow> {
    let overflow = || ValueOverflow {
        symbol: holding.symbol.clone(),
    };
    let average_cost = holding.average_cost().ok_or_else(overflow)?;
    let current_price = current_price.unwrap_or(average_cost);
    let current_value = holding
        .total_amount
        .checked_mul(current_price)
        .ok_or_else(overflow)?;
    let profit_loss = current_value
        .checked_sub(holding.total_cost)
        .ok_or_else(overflow)?;
    let profit_loss_percentage = if holding.total_cost.is_zero() {
        Decimal::ZERO
    } else {
        profit_loss
            .checked_div(holding.total_cost)
            .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
            .ok_or_else(overflow)?
    };

    Ok(PortfolioPosition {
        symbol: holding.symbol.clone(),
        total_amount: holding.total_amount,
        average_cost,
        current_price,
        current_value,
        profit_loss,
        profit_loss_percentage,
    })
}
