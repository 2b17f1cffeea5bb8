//! Binance spot ticker quote source.
//!
//! Prices come from `/api/v3/ticker/price`, which returns the last traded price
//! as a string. Internal symbols are mapped to spot pairs by appending the quote
//! asset ("BTC" -> "BTCUSDT") unless an explicit override exists.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::config::PollerConfig;
use crate::market_data::{parse_decimal, QuoteSource};
use crate::models::Symbol;

const BINANCE_API_BASE: &str = "https://api.binance.com";
/// Result cap used by the market search endpoint.
pub const DEFAULT_SEARCH_LIMIT: usize = 10;
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct TickerResponse {
    price: String,
}

#[derive(Debug, Deserialize)]
struct ExchangeInfo {
    symbols: Vec<ExchangeSymbol>,
}

#[derive(Debug, Deserialize)]
struct ExchangeSymbol {
    symbol: String,
}

pub struct BinanceQuoteSource {
    client: reqwest::Client,
    base_url: String,
    request_timeout: Duration,
    quote_asset: String,
    /// Internal symbol -> full provider pair, overriding the suffix rule.
    overrides: HashMap<String, String>,
    unsupported: HashSet<String>,
}

impl Default for BinanceQuoteSource {
    fn default() -> Self {
        Self::new()
    }
}

impl BinanceQuoteSource {
    pub fn new() -> Self {
        Self::with_client(reqwest::Client::new())
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            base_url: BINANCE_API_BASE.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            quote_asset: "USDT".to_string(),
            overrides: HashMap::new(),
            unsupported: HashSet::new(),
        }
    }

    pub fn from_config(config: &PollerConfig) -> Self {
        Self::new()
            .with_base_url(&config.base_url)
            .with_request_timeout(config.fetch_timeout)
            .with_quote_asset(&config.quote_asset)
            .with_overrides(config.symbol_map.clone())
            .with_unsupported(config.unsupported.iter().cloned())
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Upper bound for every HTTP call, including market search.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_quote_asset(mut self, quote_asset: impl Into<String>) -> Self {
        self.quote_asset = quote_asset.into().trim().to_uppercase();
        self
    }

    pub fn with_overrides(mut self, overrides: HashMap<String, String>) -> Self {
        self.overrides = overrides
            .into_iter()
            .map(|(k, v)| (k.trim().to_uppercase(), v.trim().to_uppercase()))
            .collect();
        self
    }

    pub fn with_unsupported(mut self, symbols: impl IntoIterator<Item = String>) -> Self {
        self.unsupported = symbols
            .into_iter()
            .map(|s| s.trim().to_uppercase())
            .collect();
        self
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, url: &str) -> Result<T> {
        let response = self
            .client
            .get(url)
            .timeout(self.request_timeout)
            .header("Accept", "application/json")
            .send()
            .await
            .with_context(|| format!("Binance request failed: {url}"))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Binance API error: {status} - {body}"));
        }

        response
            .json()
            .await
            .context("Failed to parse Binance response")
    }

    /// Tradable base assets quoted in the configured quote asset whose pair
    /// contains `query`. At most `limit` results, in exchange order.
    pub async fn search_symbols(&self, query: &str, limit: usize) -> Result<Vec<String>> {
        let query = query.trim().to_uppercase();
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/api/v3/exchangeInfo", self.base_url);
        let info: ExchangeInfo = self.get_json(&url).await?;

        Ok(info
            .symbols
            .into_iter()
            .filter(|s| s.symbol.contains(&query))
            .filter_map(|s| {
                s.symbol
                    .strip_suffix(self.quote_asset.as_str())
                    .filter(|base| !base.is_empty())
                    .map(str::to_string)
            })
            .take(limit)
            .collect())
    }
}

#[async_trait::async_trait]
impl QuoteSource for BinanceQuoteSource {
    fn name(&self) -> &str {
        "binance"
    }

    fn provider_symbol(&self, symbol: &Symbol) -> Option<String> {
        let internal = symbol.as_str();
        if self.unsupported.contains(internal) || internal == self.quote_asset {
            return None;
        }
        if let Some(pair) = self.overrides.get(internal) {
            return Some(pair.clone());
        }
        Some(format!("{internal}{}", self.quote_asset))
    }

    async fn fetch_price(&self, provider_symbol: &str) -> Result<Option<Decimal>> {
        let url = format!(
            "{}/api/v3/ticker/price?symbol={}",
            self.base_url, provider_symbol
        );
        let ticker: TickerResponse = self.get_json(&url).await?;

        let price = parse_decimal(&ticker.price)
            .with_context(|| format!("Invalid Binance price {:?}", ticker.price))?;
        if price <= Decimal::ZERO {
            return Ok(None);
        }
        Ok(Some(price))
    }
}
