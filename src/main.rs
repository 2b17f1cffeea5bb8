use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pricepulse::config::{default_config_path, ResolvedConfig};
use pricepulse::duration::format_duration;
use pricepulse::market_data::{MemoryPriceCache, MemorySearchIndex, PriceService};
use pricepulse::models::{Id, Symbol};
use pricepulse::portfolio::PortfolioService;
use pricepulse::registry::{initialize_defaults, JsonFileSymbolRegistry, SymbolRegistry};
use pricepulse::storage::JsonlStorage;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pricepulse")]
#[command(about = "Price pipeline administration")]
struct Cli {
    /// Path to config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Show current configuration
    Config,
    /// Inspect or extend the tracked symbols
    Symbols {
        #[command(subcommand)]
        command: SymbolsCommand,
    },
    /// Latest stored price for a symbol
    Latest { symbol: String },
    /// Valued positions for a user
    Portfolio { user: String },
}

#[derive(Subcommand)]
enum SymbolsCommand {
    /// List tracked symbols (seeding the configured defaults first)
    List,
    /// Start tracking a symbol
    Add { symbol: String },
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn default_symbols(config: &ResolvedConfig) -> Result<Vec<Symbol>> {
    config
        .poller
        .default_symbols
        .iter()
        .map(|s| Symbol::parse(s).with_context(|| format!("Invalid default symbol {s:?}")))
        .collect()
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.unwrap_or_else(default_config_path);
    let config = ResolvedConfig::load_or_default(&config_path)?;

    match cli.command {
        Some(Command::Config) => {
            println!("Config file: {}", config_path.display());
            println!("Data directory: {}", config.data_dir.display());
            println!(
                "Poller: {} every {} ({} quotes)",
                config.poller.base_url,
                format_duration(config.poller.interval),
                config.poller.quote_asset
            );
            println!(
                "Consumer: {} workers, {} attempts",
                config.consumer.workers, config.consumer.max_attempts
            );
            println!("Cache TTL: {}", format_duration(config.cache.ttl));
            println!("Search: {:?} at {}", config.search.backend, config.search.url);
            println!("Server: {}", config.server.bind);
        }
        Some(Command::Symbols { command }) => {
            let registry = JsonFileSymbolRegistry::new(&config.data_dir);
            match command {
                SymbolsCommand::List => {
                    initialize_defaults(&registry, &default_symbols(&config)?).await?;
                    print_json(&registry.list().await?)?;
                }
                SymbolsCommand::Add { symbol } => {
                    let symbol = Symbol::parse(&symbol)?;
                    let added = registry.add(&symbol).await?;
                    print_json(&serde_json::json!({ "symbol": symbol, "added": added }))?;
                }
            }
        }
        Some(Command::Latest { symbol }) => {
            let symbol = Symbol::parse(&symbol)?;
            let storage = Arc::new(JsonlStorage::new(&config.data_dir));
            let prices = PriceService::new(
                storage,
                Arc::new(MemoryPriceCache::new()),
                Arc::new(MemorySearchIndex::new()),
            );
            match prices.latest_price(&symbol).await? {
                Some(latest) => print_json(&latest)?,
                None => anyhow::bail!("No price data for {symbol}"),
            }
        }
        Some(Command::Portfolio { user }) => {
            let user = Id::from_string_checked(user)?;
            let storage = Arc::new(JsonlStorage::new(&config.data_dir));
            let prices = Arc::new(PriceService::new(
                storage.clone(),
                Arc::new(MemoryPriceCache::new()),
                Arc::new(MemorySearchIndex::new()),
            ));
            let portfolio = PortfolioService::new(storage, prices);
            print_json(&portfolio.positions(&user).await?)?;
        }
        None => {
            println!("PricePulse - Price Pipeline");
            println!("===========================\n");
            println!("Config: {}", config_path.display());
            println!("Data directory: {}\n", config.data_dir.display());
            println!("Commands:");
            println!("  config              Show current configuration");
            println!("  symbols list|add    Manage tracked symbols");
            println!("  latest <SYMBOL>     Latest stored price");
            println!("  portfolio <USER>    Valued positions\n");
            println!("Run 'pricepulse --help' for more options.");
        }
    }

    Ok(())
}
