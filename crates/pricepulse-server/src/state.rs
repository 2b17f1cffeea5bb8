//! Shared handles for request handlers.

use std::sync::Arc;

use pricepulse::channel::EventChannel;
use pricepulse::clock::Clock;
use pricepulse::market_data::providers::BinanceQuoteSource;
use pricepulse::market_data::PriceService;
use pricepulse::notify::PriceNotifier;
use pricepulse::portfolio::PortfolioService;
use pricepulse::registry::SymbolRegistry;
use pricepulse::shutdown::ShutdownSignal;

#[derive(Clone)]
pub struct AppState {
    pub prices: Arc<PriceService>,
    pub portfolio: Arc<PortfolioService>,
    pub registry: Arc<dyn SymbolRegistry>,
    pub channel: Arc<dyn EventChannel>,
    /// Provider-side symbol search.
    pub market: Arc<BinanceQuoteSource>,
    pub notifier: PriceNotifier,
    pub clock: Arc<dyn Clock>,
    /// Closes open WebSocket streams when the server stops.
    pub shutdown: ShutdownSignal,
    pub default_history_hours: u32,
}
