//! Periodic bridge from the external quote source into price events.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::channel::EventChannel;
use crate::clock::{Clock, SystemClock};
use crate::config::PollerConfig;
use crate::market_data::{PriceEvent, QuoteSource};
use crate::models::Symbol;
use crate::registry::SymbolRegistry;
use crate::shutdown::ShutdownSignal;

/// Per-tick counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PollSummary {
    pub symbols: usize,
    pub published: usize,
    /// Symbols the provider cannot quote, or quoted without a usable price.
    pub skipped: usize,
    /// Fetch or publish failures, including timeouts.
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Published,
    Skipped,
    Failed,
}

pub struct MarketPoller {
    registry: Arc<dyn SymbolRegistry>,
    source: Arc<dyn QuoteSource>,
    channel: Arc<dyn EventChannel>,
    clock: Arc<dyn Clock>,
    interval: Duration,
    error_backoff: Duration,
    fetch_timeout: Duration,
}

impl MarketPoller {
    pub fn new(
        registry: Arc<dyn SymbolRegistry>,
        source: Arc<dyn QuoteSource>,
        channel: Arc<dyn EventChannel>,
    ) -> Self {
        let defaults = PollerConfig::default();
        Self {
            registry,
            source,
            channel,
            clock: Arc::new(SystemClock),
            interval: defaults.interval,
            error_backoff: defaults.error_backoff,
            fetch_timeout: defaults.fetch_timeout,
        }
    }

    pub fn with_config(mut self, config: &PollerConfig) -> Self {
        self.interval = config.interval;
        self.error_backoff = config.error_backoff;
        self.fetch_timeout = config.fetch_timeout;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_error_backoff(mut self, backoff: Duration) -> Self {
        self.error_backoff = backoff;
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Run a single tick over every tracked symbol.
    ///
    /// Per-symbol problems are counted in the summary; only failing to read
    /// the registry is an error.
    pub async fn poll_once(&self) -> Result<PollSummary> {
        let symbols = self
            .registry
            .list()
            .await
            .context("Failed to read symbol registry")?;

        let outcomes = join_all(symbols.iter().map(|symbol| self.poll_symbol(symbol))).await;

        let mut summary = PollSummary {
            symbols: symbols.len(),
            ..PollSummary::default()
        };
        for outcome in outcomes {
            match outcome {
                Outcome::Published => summary.published += 1,
                Outcome::Skipped => summary.skipped += 1,
                Outcome::Failed => summary.failed += 1,
            }
        }
        Ok(summary)
    }

    async fn poll_symbol(&self, symbol: &Symbol) -> Outcome {
        let Some(provider_symbol) = self.source.provider_symbol(symbol) else {
            debug!(symbol = %symbol, source = self.source.name(), "symbol not quotable; skipping");
            return Outcome::Skipped;
        };

        let fetched = tokio::time::timeout(
            self.fetch_timeout,
            self.source.fetch_price(&provider_symbol),
        )
        .await;
        let price = match fetched {
            Ok(Ok(Some(price))) => price,
            Ok(Ok(None)) => {
                debug!(symbol = %symbol, provider_symbol = %provider_symbol, "no usable price");
                return Outcome::Skipped;
            }
            Ok(Err(e)) => {
                warn!(symbol = %symbol, provider_symbol = %provider_symbol, error = %e, "quote fetch failed");
                return Outcome::Failed;
            }
            Err(_) => {
                warn!(
                    symbol = %symbol,
                    provider_symbol = %provider_symbol,
                    timeout_ms = self.fetch_timeout.as_millis() as u64,
                    "quote fetch timed out"
                );
                return Outcome::Failed;
            }
        };

        // Tagged with the internal symbol, never the provider pair.
        let event = match PriceEvent::new(symbol.clone(), price, self.clock.now()) {
            Ok(event) => event,
            Err(e) => {
                debug!(symbol = %symbol, error = %e, "discarding quote");
                return Outcome::Skipped;
            }
        };

        match self.channel.publish(event).await {
            Ok(()) => {
                debug!(symbol = %symbol, price = %price, "price event published");
                Outcome::Published
            }
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "failed to publish price event");
                Outcome::Failed
            }
        }
    }

    /// Poll until shutdown. Waits `interval` after a tick, or `error_backoff`
    /// after a tick that failed as a whole.
    pub async fn run(&self, mut shutdown: ShutdownSignal) {
        info!(
            source = self.source.name(),
            interval_ms = self.interval.as_millis() as u64,
            "market poller started"
        );

        loop {
            let delay = tokio::select! {
                _ = shutdown.cancelled() => break,
                result = self.poll_once() => match result {
                    Ok(summary) => {
                        debug!(
                            symbols = summary.symbols,
                            published = summary.published,
                            skipped = summary.skipped,
                            failed = summary.failed,
                            "poll tick complete"
                        );
                        self.interval
                    }
                    Err(e) => {
                        error!(error = %e, "poll tick failed; backing off");
                        self.error_backoff
                    }
                },
            };

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        info!("market poller stopped");
    }
}
