use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{de, Deserialize, Deserializer, Serialize};

use crate::models::{Id, Symbol};

/// Price observation travelling over the event channel.
///
/// Wire form: `{ "symbol": "BTC", "price": 65000.5 | "65000.5", "timestamp": "…Z" }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawPriceEvent")]
pub struct PriceEvent {
    pub symbol: Symbol,
    pub price: Decimal,
    #[serde(rename = "timestamp")]
    pub observed_at: DateTime<Utc>,
}

/// Unchecked wire shape; every decoded event goes through [`PriceEvent::new`].
#[derive(Deserialize)]
struct RawPriceEvent {
    symbol: Symbol,
    #[serde(deserialize_with = "deserialize_price")]
    price: Decimal,
    timestamp: DateTime<Utc>,
}

impl TryFrom<RawPriceEvent> for PriceEvent {
    type Error = NonPositivePrice;

    fn try_from(raw: RawPriceEvent) -> Result<Self, Self::Error> {
        Self::new(raw.symbol, raw.price, raw.timestamp)
    }
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
#[error("price must be positive, got {0}")]
pub struct NonPositivePrice(pub Decimal);

impl PriceEvent {
    pub fn new(
        symbol: Symbol,
        price: Decimal,
        observed_at: DateTime<Utc>,
    ) -> Result<Self, NonPositivePrice> {
        if price <= Decimal::ZERO {
            return Err(NonPositivePrice(price));
        }
        Ok(Self {
            symbol,
            price,
            observed_at,
        })
    }
}

/// Authoritative, append-only price row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceRecord {
    pub id: Id,
    pub symbol: Symbol,
    pub price: Decimal,
    pub observed_at: DateTime<Utc>,
    pub recorded_at: DateTime<Utc>,
}

impl PriceRecord {
    pub fn from_event(event: &PriceEvent, id: Id, recorded_at: DateTime<Utc>) -> Self {
        Self {
            id,
            symbol: event.symbol.clone(),
            price: event.price,
            observed_at: event.observed_at,
            recorded_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceSource {
    Cache,
    Store,
}

/// Result of the latest-price read path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatestPrice {
    pub source: PriceSource,
    pub data: PriceRecord,
}

pub const HISTORY_SOURCE: &str = "search-index";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceHistory {
    pub source: String,
    pub count: usize,
    pub data: Vec<PriceRecord>,
}

impl PriceHistory {
    pub fn from_records(data: Vec<PriceRecord>) -> Self {
        Self {
            source: HISTORY_SOURCE.to_string(),
            count: data.len(),
            data,
        }
    }
}

/// Manual submission accepted by the publish endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct PriceSubmission {
    pub symbol: String,
    #[serde(deserialize_with = "deserialize_price")]
    pub price: Decimal,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, thiserror::Error)]
pub enum SubmissionError {
    #[error(transparent)]
    Symbol(#[from] crate::models::SymbolError),
    #[error(transparent)]
    Price(#[from] NonPositivePrice),
}

impl PriceSubmission {
    /// Validate and stamp with `now` when no timestamp was given.
    pub fn into_event(self, now: DateTime<Utc>) -> Result<PriceEvent, SubmissionError> {
        let symbol = Symbol::parse(&self.symbol)?;
        Ok(PriceEvent::new(
            symbol,
            self.price,
            self.timestamp.unwrap_or(now),
        )?)
    }
}

/// Pushed to real-time subscribers after each committed event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceNotification {
    pub symbol: Symbol,
    pub price: Decimal,
    pub timestamp: DateTime<Utc>,
}

impl From<&PriceRecord> for PriceNotification {
    fn from(record: &PriceRecord) -> Self {
        Self {
            symbol: record.symbol.clone(),
            price: record.price,
            timestamp: record.observed_at,
        }
    }
}

/// Parse a decimal from its textual form, accepting exponent notation.
pub fn parse_decimal(raw: &str) -> Option<Decimal> {
    let raw = raw.trim();
    Decimal::from_str(raw)
        .or_else(|_| Decimal::from_scientific(raw))
        .ok()
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawPrice {
    Number(serde_json::Number),
    Text(String),
}

fn deserialize_price<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
where
    D: Deserializer<'de>,
{
    let text = match RawPrice::deserialize(deserializer)? {
        RawPrice::Number(n) => n.to_string(),
        RawPrice::Text(s) => s,
    };
    parse_decimal(&text).ok_or_else(|| de::Error::custom(format!("invalid price {text:?}")))
}
