pub mod channel;
pub mod clock;
pub mod config;
pub mod duration;
pub mod fanout;
pub mod market_data;
pub mod models;
pub mod notify;
pub mod poller;
pub mod portfolio;
pub mod registry;
pub mod reporting;
pub mod shutdown;
pub mod storage;
pub mod timeout;
