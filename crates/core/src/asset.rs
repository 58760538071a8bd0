//! Tracked tickers and the market metrics fetched for them.

use crate::format::format_grouped;
use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Tickers tracked when the deployment does not configure its own list.
pub const DEFAULT_TICKERS: &[&str] = &["btc", "eth", "ada", "dot", "link", "ltc"];

/// Opaque market asset identifier (e.g., "btc", "eth").
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ticker(CompactString);

impl Ticker {
    /// Create a ticker, trimming surrounding whitespace.
    pub fn new(symbol: &str) -> Self {
        Self(CompactString::new(symbol.trim()))
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Parse a comma-separated ticker list, skipping empty entries.
    pub fn parse_list(list: &str) -> Vec<Ticker> {
        list.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(Ticker::new)
            .collect()
    }

    /// The default tracked ticker list.
    pub fn defaults() -> Vec<Ticker> {
        DEFAULT_TICKERS.iter().map(|s| Ticker::new(s)).collect()
    }
}

impl fmt::Display for Ticker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for Ticker {
    fn from(symbol: &str) -> Self {
        Self::new(symbol)
    }
}

/// Market metrics for one asset, fetched fresh on every run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetMetrics {
    /// Display name (e.g., "Bitcoin")
    pub name: String,
    /// Exchange symbol (e.g., "BTC")
    pub symbol: String,
    /// Current price in USD
    pub price_usd: f64,
    /// Trade volume over the trailing hour
    pub volume_last_1h: f64,
    /// Percent price change (USD) over the trailing hour
    pub percent_change_last_1h: f64,
}

impl AssetMetrics {
    /// Render the four-line alert block, including its trailing blank line.
    pub fn render_block(&self) -> String {
        format!(
            "{} [{}]\n\
             Current Price: ${}\n\
             Volume(1h): {}\n\
             Percent Change(1h): {}%\n\n",
            self.name,
            self.symbol,
            format_grouped(self.price_usd, 2),
            format_grouped(self.volume_last_1h, 0),
            format_grouped(self.percent_change_last_1h, 2),
        )
    }
}
