//! Error types for conversation and dispatch operations.

use sicc_feeds::FeedError;
use thiserror::Error;

/// Errors from the messaging provider's conversation API.
#[derive(Error, Debug)]
pub enum ConversationError {
    #[error("Request failed: {0}")]
    Http(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("API error (HTTP {status}, code {code:?}): {message}")]
    Api {
        status: u16,
        code: Option<u64>,
        message: String,
    },

    #[error("Failed to parse response: {0}")]
    Parse(String),

    #[error("Conversation not found: {0}")]
    ConversationNotFound(String),

    #[error("Failed to build HTTP client: {0}")]
    Client(String),
}

impl From<reqwest::Error> for ConversationError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ConversationError::Timeout(err.to_string())
        } else if err.is_decode() {
            ConversationError::Parse(err.to_string())
        } else {
            ConversationError::Http(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ConversationError {
    fn from(err: serde_json::Error) -> Self {
        ConversationError::Parse(err.to_string())
    }
}

/// Result type for conversation operations.
pub type ConversationResult<T> = Result<T, ConversationError>;

/// Errors that abort an alert dispatch.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("No tickers configured")]
    NoTickers,

    #[error("Failed to fetch {ticker}: {source}")]
    Fetch {
        ticker: String,
        #[source]
        source: FeedError,
    },

    #[error("Every ticker failed: {}", .0.join(", "))]
    AllFetchesFailed(Vec<String>),

    #[error("Delivery failed: {0}")]
    Delivery(#[from] ConversationError),
}
