//! Pluggable market data source.
//!
//! A source pairs a fetch step (raw provider payload for one ticker) with a
//! transform step (payload to alert block), so the dispatcher never depends
//! on a specific provider.

use crate::error::{FeedError, FeedResult};
use crate::transform::messari_block;
use async_trait::async_trait;
use serde_json::{json, Value};
use sicc_core::Ticker;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

/// Trait for market data providers.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Provider name, for logging.
    fn name(&self) -> &str;

    /// Fetch the raw metrics payload for one ticker.
    async fn fetch(&self, ticker: &Ticker) -> FeedResult<Value>;

    /// Render one raw payload as an alert block.
    fn transform(&self, raw: &Value) -> FeedResult<String>;

    /// Fetch and transform in one step.
    async fn fetch_block(&self, ticker: &Ticker) -> FeedResult<String> {
        let raw = self.fetch(ticker).await?;
        self.transform(&raw)
    }
}

/// In-memory source serving Messari-shaped payloads.
///
/// Records every fetched ticker. Unknown tickers answer with HTTP 404.
#[derive(Debug, Default)]
pub struct MockMarketSource {
    payloads: HashMap<String, Value>,
    delays: HashMap<String, Duration>,
    calls: Mutex<Vec<String>>,
}

impl MockMarketSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve a well-formed payload for `ticker`.
    pub fn with_asset(
        mut self,
        ticker: &str,
        name: &str,
        symbol: &str,
        price_usd: f64,
        volume: f64,
        percent_change: f64,
    ) -> Self {
        let payload = json!({
            "data": {
                "name": name,
                "symbol": symbol,
                "market_data": {
                    "price_usd": price_usd,
                    "percent_change_usd_last_1_hour": percent_change,
                    "ohlcv_last_1_hour": {"volume": volume}
                }
            }
        });
        self.payloads.insert(ticker.to_string(), payload);
        self
    }

    /// Serve an arbitrary payload for `ticker`.
    pub fn with_payload(mut self, ticker: &str, payload: Value) -> Self {
        self.payloads.insert(ticker.to_string(), payload);
        self
    }

    /// Delay the response for `ticker`.
    pub fn with_delay(mut self, ticker: &str, delay: Duration) -> Self {
        self.delays.insert(ticker.to_string(), delay);
        self
    }

    /// Tickers fetched so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl MarketDataSource for MockMarketSource {
    fn name(&self) -> &str {
        "mock"
    }

    async fn fetch(&self, ticker: &Ticker) -> FeedResult<Value> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(ticker.to_string());
        }
        if let Some(delay) = self.delays.get(ticker.as_str()) {
            tokio::time::sleep(*delay).await;
        }
        self.payloads
            .get(ticker.as_str())
            .cloned()
            .ok_or_else(|| FeedError::Status {
                ticker: ticker.to_string(),
                status: 404,
            })
    }

    fn transform(&self, raw: &Value) -> FeedResult<String> {
        messari_block(raw)
    }
}
