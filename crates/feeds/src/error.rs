//! Error types for market data operations.

use thiserror::Error;

/// Errors that can occur while fetching or transforming market data.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Request failed: {0}")]
    ConnectionFailed(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("HTTP {status} for {ticker}")]
    Status { ticker: String, status: u16 },

    #[error("Failed to parse response: {0}")]
    ParseError(String),

    #[error("Missing or non-numeric field `{0}` in market data")]
    MissingField(&'static str),

    #[error("Failed to build HTTP client: {0}")]
    Client(String),
}

impl From<reqwest::Error> for FeedError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FeedError::Timeout(err.to_string())
        } else if err.is_decode() {
            FeedError::ParseError(err.to_string())
        } else {
            FeedError::ConnectionFailed(err.to_string())
        }
    }
}

impl From<serde_json::Error> for FeedError {
    fn from(err: serde_json::Error) -> Self {
        FeedError::ParseError(err.to_string())
    }
}

/// Result type for feed operations.
pub type FeedResult<T> = Result<T, FeedError>;
