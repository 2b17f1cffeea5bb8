pub mod binance;

pub use binance::BinanceQuoteSource;
