//! Messari REST metrics fetcher.

use crate::error::{FeedError, FeedResult};
use crate::source::MarketDataSource;
use crate::transform::messari_block;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use serde_json::Value;
use sicc_core::Ticker;
use std::time::Duration;
use tracing::debug;

/// Market data source backed by the Messari asset metrics endpoint.
pub struct MessariSource {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl std::fmt::Debug for MessariSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessariSource")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl MessariSource {
    pub const BASE_URL: &'static str = "https://data.messari.io";
    pub const API_KEY_HEADER: &'static str = "x-messari-api-key";

    /// Create a source with a per-request timeout.
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> FeedResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FeedError::Client(e.to_string()))?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: Self::BASE_URL.to_string(),
        })
    }

    /// Point the source at a different host (e.g., a local stub).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Metrics URL for a ticker.
    pub fn metrics_url(&self, ticker: &Ticker) -> String {
        format!("{}/api/v1/assets/{}/metrics", self.base_url, ticker)
    }
}

#[async_trait]
impl MarketDataSource for MessariSource {
    fn name(&self) -> &str {
        "messari"
    }

    async fn fetch(&self, ticker: &Ticker) -> FeedResult<Value> {
        let url = self.metrics_url(ticker);
        debug!(ticker = %ticker, "Messari: fetching metrics");

        let response = self
            .client
            .get(&url)
            .header(CONTENT_TYPE, "application/json")
            .header(Self::API_KEY_HEADER, &self.api_key)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            debug!(ticker = %ticker, status = status.as_u16(), "Messari: non-success status");
            return Err(FeedError::Status {
                ticker: ticker.to_string(),
                status: status.as_u16(),
            });
        }

        Ok(response.json::<Value>().await?)
    }

    fn transform(&self, raw: &Value) -> FeedResult<String> {
        messari_block(raw)
    }
}
