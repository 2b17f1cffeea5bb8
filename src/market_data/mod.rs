mod cache;
mod elasticsearch;
mod models;
pub mod providers;
mod search;
mod service;
mod source;

pub use cache::{cache_key, MemoryPriceCache, PriceCache};
pub use elasticsearch::ElasticsearchIndex;
pub use models::{
    parse_decimal, LatestPrice, NonPositivePrice, PriceEvent, PriceHistory, PriceNotification,
    PriceRecord, PriceSource, PriceSubmission, SubmissionError, HISTORY_SOURCE,
};
pub use search::{MemorySearchIndex, SearchIndex};
pub use service::{PriceService, DEFAULT_CACHE_TTL, DEFAULT_HISTORY_LIMIT, DEFAULT_READ_TIMEOUT};
pub use source::QuoteSource;
