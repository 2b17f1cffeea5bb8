use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::duration::{deserialize_duration, serialize_duration};

fn default_true() -> bool {
    true
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_error_backoff() -> Duration {
    Duration::from_secs(10)
}

fn default_fetch_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_quote_asset() -> String {
    "USDT".to_string()
}

fn default_quote_base_url() -> String {
    "https://api.binance.com".to_string()
}

/// Symbols seeded into the registry on first start.
fn default_symbols() -> Vec<String> {
    ["BTC", "ETH", "SOL", "AVAX", "XRP", "XAG", "XAU"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Market poller settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollerConfig {
    /// Disable to run the API without ingesting from the quote provider.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Delay between successful ticks.
    #[serde(
        default = "default_poll_interval",
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub interval: Duration,

    /// Delay after a tick that failed as a whole (e.g. registry unreadable).
    #[serde(
        default = "default_error_backoff",
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub error_backoff: Duration,

    /// Upper bound for a single quote request.
    #[serde(
        default = "default_fetch_timeout",
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub fetch_timeout: Duration,

    /// Quote currency appended to tracked symbols ("BTC" -> "BTCUSDT").
    #[serde(default = "default_quote_asset")]
    pub quote_asset: String,

    #[serde(default = "default_quote_base_url")]
    pub base_url: String,

    /// Explicit internal symbol -> provider symbol overrides.
    #[serde(default)]
    pub symbol_map: HashMap<String, String>,

    /// Symbols the provider is known not to list; these are skipped silently.
    #[serde(default)]
    pub unsupported: Vec<String>,

    #[serde(default = "default_symbols")]
    pub default_symbols: Vec<String>,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: default_poll_interval(),
            error_backoff: default_error_backoff(),
            fetch_timeout: default_fetch_timeout(),
            quote_asset: default_quote_asset(),
            base_url: default_quote_base_url(),
            symbol_map: HashMap::new(),
            unsupported: Vec::new(),
            default_symbols: default_symbols(),
        }
    }
}

fn default_workers() -> usize {
    2
}

fn default_sink_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_max_attempts() -> u32 {
    5
}

fn default_retry_base_delay() -> Duration {
    Duration::from_millis(500)
}

fn default_retry_max_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_queue_capacity() -> usize {
    1024
}

fn default_journal_compact_every() -> u64 {
    1000
}

/// Fan-out consumer and event channel settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsumerConfig {
    /// Number of competing consumer workers on the price subscription.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Upper bound for each sink call (store, cache, search index).
    #[serde(
        default = "default_sink_timeout",
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub sink_timeout: Duration,

    /// Deliveries before an event is dead-lettered.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(
        default = "default_retry_base_delay",
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub retry_base_delay: Duration,

    #[serde(
        default = "default_retry_max_delay",
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub retry_max_delay: Duration,

    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Acks between two rewrites of the event journal.
    #[serde(default = "default_journal_compact_every")]
    pub journal_compact_every: u64,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            sink_timeout: default_sink_timeout(),
            max_attempts: default_max_attempts(),
            retry_base_delay: default_retry_base_delay(),
            retry_max_delay: default_retry_max_delay(),
            queue_capacity: default_queue_capacity(),
            journal_compact_every: default_journal_compact_every(),
        }
    }
}

fn default_cache_ttl() -> Duration {
    Duration::from_secs(60 * 60)
}

/// Latest-price cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    #[serde(
        default = "default_cache_ttl",
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: default_cache_ttl(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SearchBackend {
    #[default]
    Memory,
    Elasticsearch,
}

fn default_search_url() -> String {
    "http://localhost:9200".to_string()
}

fn default_search_index() -> String {
    "crypto-prices".to_string()
}

fn default_history_limit() -> usize {
    1000
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(5)
}

/// Price history search index settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub backend: SearchBackend,

    #[serde(default = "default_search_url")]
    pub url: String,

    #[serde(default = "default_search_index")]
    pub index: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// Never written back out; wrapped in a secret once the index client is built.
    #[serde(skip_serializing)]
    pub password: Option<String>,

    /// Maximum records returned by a history query.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// Upper bound for each HTTP call to the index.
    #[serde(
        default = "default_request_timeout",
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub request_timeout: Duration,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            backend: SearchBackend::default(),
            url: default_search_url(),
            index: default_search_index(),
            username: None,
            password: None,
            history_limit: default_history_limit(),
            request_timeout: default_request_timeout(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_history_hours() -> u32 {
    24
}

fn default_read_timeout() -> Duration {
    Duration::from_secs(5)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Window used by the history endpoint when the caller gives none.
    #[serde(default = "default_history_hours")]
    pub default_history_hours: u32,

    /// Upper bound for each cache, store or index call on a read path.
    #[serde(
        default = "default_read_timeout",
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub read_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            default_history_hours: default_history_hours(),
            read_timeout: default_read_timeout(),
        }
    }
}

fn default_report_interval() -> Duration {
    Duration::from_secs(60)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportingConfig {
    #[serde(
        default = "default_report_interval",
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub interval: Duration,
}

impl Default for ReportingConfig {
    fn default() -> Self {
        Self {
            interval: default_report_interval(),
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Path to data directory. If relative, resolved from config file location.
    /// If not specified, defaults to the config file's directory.
    pub data_dir: Option<PathBuf>,

    pub poller: PollerConfig,
    pub consumer: ConsumerConfig,
    pub cache: CacheConfig,
    pub search: SearchConfig,
    pub server: ServerConfig,
    pub reporting: ReportingConfig,
}

impl Config {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load config from a file, or return default config if file doesn't exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Resolve the data directory path.
    ///
    /// If `data_dir` is set and relative, it's resolved relative to `config_dir`.
    /// If `data_dir` is not set, returns `config_dir`.
    pub fn resolve_data_dir(&self, config_dir: &Path) -> PathBuf {
        match &self.data_dir {
            Some(data_dir) if data_dir.is_absolute() => data_dir.clone(),
            Some(data_dir) => config_dir.join(data_dir),
            None => config_dir.to_path_buf(),
        }
    }
}

/// Loaded configuration with resolved paths.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub data_dir: PathBuf,
    pub poller: PollerConfig,
    pub consumer: ConsumerConfig,
    pub cache: CacheConfig,
    pub search: SearchConfig,
    pub server: ServerConfig,
    pub reporting: ReportingConfig,
}

/// Returns the default config file path.
///
/// Resolution order:
/// 1. `./pricepulse.toml` if it exists in current directory
/// 2. `~/.local/share/pricepulse/pricepulse.toml` (XDG data directory)
pub fn default_config_path() -> PathBuf {
    let local_config = PathBuf::from("pricepulse.toml");
    if local_config.exists() {
        return local_config;
    }

    if let Some(data_dir) = dirs::data_dir() {
        return data_dir.join("pricepulse").join("pricepulse.toml");
    }

    local_config
}

impl ResolvedConfig {
    fn from_config(config: Config, config_dir: &Path) -> Self {
        let data_dir = config.resolve_data_dir(config_dir);
        Self {
            data_dir,
            poller: config.poller,
            consumer: config.consumer,
            cache: config.cache,
            search: config.search,
            server: config.server,
            reporting: config.reporting,
        }
    }

    /// Load and resolve config from a file path.
    ///
    /// The data directory is resolved relative to the config file's parent directory.
    pub fn load(config_path: &Path) -> Result<Self> {
        let config_path = config_path
            .canonicalize()
            .with_context(|| format!("Config file not found: {}", config_path.display()))?;

        let config_dir = config_path
            .parent()
            .context("Config file has no parent directory")?;

        let config = Config::load(&config_path)?;
        Ok(Self::from_config(config, config_dir))
    }

    /// Load config, falling back to defaults if the file doesn't exist.
    ///
    /// Without a file the intended parent directory of the config path becomes the
    /// data directory.
    pub fn load_or_default(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            return Self::load(config_path);
        }

        let config_path = if config_path.is_relative() {
            std::env::current_dir()
                .context("Failed to get current directory")?
                .join(config_path)
        } else {
            config_path.to_path_buf()
        };

        let config_dir = config_path
            .parent()
            .context("Config path has no parent directory")?;

        Ok(Self::from_config(Config::default(), config_dir))
    }
}
