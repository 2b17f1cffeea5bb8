use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use pricepulse::channel::{EventChannel, EventJournal, LocalEventChannel, RetryPolicy};
use pricepulse::clock::{Clock, SystemClock};
use pricepulse::config::{default_config_path, ResolvedConfig, SearchBackend};
use pricepulse::fanout::FanOutConsumer;
use pricepulse::market_data::providers::BinanceQuoteSource;
use pricepulse::market_data::{
    ElasticsearchIndex, MemoryPriceCache, MemorySearchIndex, PriceService, SearchIndex,
};
use pricepulse::models::{Symbol, UuidIdGenerator};
use pricepulse::notify::PriceNotifier;
use pricepulse::poller::MarketPoller;
use pricepulse::portfolio::PortfolioService;
use pricepulse::registry::{initialize_defaults, JsonFileSymbolRegistry};
use pricepulse::reporting::run_market_report;
use pricepulse::shutdown;
use pricepulse::storage::JsonlStorage;
use pricepulse_server::{create_app, AppState};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Parser)]
#[command(name = "pricepulse-server")]
#[command(about = "Price ingestion pipeline with an HTTP/WebSocket API")]
struct Args {
    /// Path to config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listen address from the config
    #[arg(long)]
    bind: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.log_json);

    let config_path = args.config.unwrap_or_else(default_config_path);
    let config = ResolvedConfig::load_or_default(&config_path)?;
    info!(
        config = %config_path.display(),
        data_dir = %config.data_dir.display(),
        "starting pricepulse server"
    );

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let storage = Arc::new(JsonlStorage::new(&config.data_dir));
    let cache = Arc::new(MemoryPriceCache::with_clock(clock.clone()));
    let search: Arc<dyn SearchIndex> = match config.search.backend {
        SearchBackend::Memory => Arc::new(MemorySearchIndex::new()),
        SearchBackend::Elasticsearch => Arc::new(ElasticsearchIndex::from_config(&config.search)),
    };

    let channel = Arc::new(LocalEventChannel::build(
        config.consumer.queue_capacity,
        RetryPolicy::from_config(&config.consumer),
        Some(
            EventJournal::new(config.data_dir.join("journal"))
                .with_compact_every(config.consumer.journal_compact_every),
        ),
        Arc::new(UuidIdGenerator),
    ));
    let registry = Arc::new(JsonFileSymbolRegistry::new(&config.data_dir));
    let defaults = config
        .poller
        .default_symbols
        .iter()
        .map(|s| Symbol::parse(s).with_context(|| format!("Invalid default symbol {s:?}")))
        .collect::<Result<Vec<_>>>()?;
    initialize_defaults(registry.as_ref(), &defaults).await?;

    let notifier = PriceNotifier::default();
    let (trigger, signal) = shutdown::channel();
    let trigger = Arc::new(trigger);
    let mut tasks: Vec<JoinHandle<()>> = Vec::new();

    let consumer = Arc::new(
        FanOutConsumer::new(storage.clone(), cache.clone(), search.clone())
            .with_notifier(notifier.clone())
            .with_clock(clock.clone())
            .with_cache_ttl(config.cache.ttl)
            .with_sink_timeout(config.consumer.sink_timeout),
    );
    for _ in 0..config.consumer.workers.max(1) {
        tasks.push(channel.subscribe(consumer.clone(), signal.clone()));
    }
    info!(workers = config.consumer.workers.max(1), "fan-out consumers started");
    channel
        .recover()
        .await
        .context("Failed to recover event journal")?;

    let market = Arc::new(BinanceQuoteSource::from_config(&config.poller));
    if config.poller.enabled {
        let poller = MarketPoller::new(registry.clone(), market.clone(), channel.clone())
            .with_config(&config.poller)
            .with_clock(clock.clone());
        let signal = signal.clone();
        tasks.push(tokio::spawn(async move { poller.run(signal).await }));
    } else {
        info!("market poller disabled");
    }

    tasks.push(tokio::spawn(run_market_report(
        storage.clone(),
        config.reporting.interval,
        signal.clone(),
    )));

    let prices = Arc::new(
        PriceService::new(storage.clone(), cache, search)
            .with_cache_ttl(config.cache.ttl)
            .with_history_limit(config.search.history_limit)
            .with_read_timeout(config.server.read_timeout)
            .with_clock(clock.clone()),
    );
    let portfolio = Arc::new(PortfolioService::new(storage, prices.clone()).with_clock(clock.clone()));

    let state = AppState {
        prices,
        portfolio,
        registry,
        channel: channel.clone(),
        market,
        notifier,
        clock,
        shutdown: signal,
        default_history_hours: config.server.default_history_hours,
    };

    let bind = args.bind.unwrap_or_else(|| config.server.bind.clone());
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("Failed to bind {bind}"))?;
    info!(addr = %bind, "listening");

    let on_ctrl_c = trigger.clone();
    axum::serve(listener, create_app(state))
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for ctrl-c");
            }
            info!("shutdown requested");
            on_ctrl_c.trigger();
        })
        .await
        .context("HTTP server failed")?;

    trigger.trigger();
    let drained = tokio::time::timeout(DRAIN_TIMEOUT, futures::future::join_all(tasks)).await;
    if drained.is_err() {
        warn!("background tasks did not stop in time");
    }

    let stats = channel.delivery_stats();
    info!(
        delivered = stats.delivered,
        redelivered = stats.redelivered,
        dead_lettered = stats.dead_lettered,
        queued = channel.queued(),
        "pricepulse server stopped"
    );
    Ok(())
}
