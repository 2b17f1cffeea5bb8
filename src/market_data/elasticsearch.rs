//! Elasticsearch-backed [`SearchIndex`] over its plain HTTP API.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;

use crate::config::SearchConfig;
use crate::models::Symbol;

use super::{PriceRecord, SearchIndex};

#[derive(Debug, Deserialize)]
struct SearchResponse {
    hits: Hits,
}

#[derive(Debug, Deserialize)]
struct Hits {
    hits: Vec<Hit>,
}

#[derive(Debug, Deserialize)]
struct Hit {
    #[serde(rename = "_source")]
    source: PriceRecord,
}

pub struct ElasticsearchIndex {
    client: reqwest::Client,
    base_url: String,
    index: String,
    request_timeout: Duration,
    credentials: Option<(String, SecretString)>,
}

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

impl ElasticsearchIndex {
    pub fn new(base_url: impl Into<String>, index: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url, index)
    }

    pub fn with_client(
        client: reqwest::Client,
        base_url: impl Into<String>,
        index: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            index: index.into(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            credentials: None,
        }
    }

    pub fn with_basic_auth(mut self, username: impl Into<String>, password: SecretString) -> Self {
        self.credentials = Some((username.into(), password));
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn from_config(config: &SearchConfig) -> Self {
        let index =
            Self::new(&config.url, &config.index).with_request_timeout(config.request_timeout);
        match (&config.username, &config.password) {
            (Some(user), Some(password)) => {
                index.with_basic_auth(user.clone(), SecretString::from(password.clone()))
            }
            _ => index,
        }
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let request = request.timeout(self.request_timeout);
        match &self.credentials {
            Some((user, password)) => request.basic_auth(user, Some(password.expose_secret())),
            None => request,
        }
    }

    fn search_body(
        symbol: &Symbol,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        limit: usize,
    ) -> serde_json::Value {
        json!({
            "query": {
                "bool": {
                    "must": [
                        { "term": { "symbol.keyword": symbol.as_str() } },
                        { "range": { "observed_at": { "gte": from, "lte": to } } }
                    ]
                }
            },
            "sort": [ { "observed_at": { "order": "desc" } } ],
            "size": limit
        })
    }
}

#[async_trait::async_trait]
impl SearchIndex for ElasticsearchIndex {
    async fn index_price(&self, record: &PriceRecord) -> Result<()> {
        let url = format!("{}/{}/_doc/{}", self.base_url, self.index, record.id);
        let response = self
            .authorize(self.client.put(&url))
            .json(record)
            .send()
            .await
            .context("Failed to reach search index")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Search index rejected document: {status} - {body}"));
        }
        Ok(())
    }

    async fn search(
        &self,
        symbol: &Symbol,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<PriceRecord>> {
        let url = format!("{}/{}/_search", self.base_url, self.index);
        let response = self
            .authorize(self.client.post(&url))
            .json(&Self::search_body(symbol, from, to, limit))
            .send()
            .await
            .context("Failed to reach search index")?;

        // Nothing has been indexed yet.
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Search query failed: {status} - {body}"));
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .context("Failed to parse search response")?;
        Ok(parsed.hits.hits.into_iter().map(|hit| hit.source).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn search_body_filters_symbol_and_window() {
        let from = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let to = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let body = ElasticsearchIndex::search_body(&Symbol::parse("BTC").unwrap(), from, to, 1000);

        assert_eq!(body["size"], 1000);
        assert_eq!(body["query"]["bool"]["must"][0]["term"]["symbol.keyword"], "BTC");
        assert_eq!(
            body["query"]["bool"]["must"][1]["range"]["observed_at"]["gte"],
            "2024-01-01T00:00:00Z"
        );
        assert_eq!(body["sort"][0]["observed_at"]["order"], "desc");
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        let index = ElasticsearchIndex::new("http://localhost:9200/", "crypto-prices");
        assert_eq!(index.base_url, "http://localhost:9200");
    }
}
