//! Time limits for calls into external sinks and sources.

use std::future::Future;
use std::time::Duration;

use anyhow::{anyhow, Result};

/// Run `fut`, turning an overrun of `limit` into an error naming `what`.
pub async fn with_timeout<T>(limit: Duration, what: &str, fut: impl Future<Output = Result<T>>) -> Result<T> {
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(anyhow!("{what} call timed out after {}ms", limit.as_millis())),
    }
}
