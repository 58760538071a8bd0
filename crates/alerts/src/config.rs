//! Alert delivery settings.

use serde::{Deserialize, Serialize};

/// Conversation name used when none is configured.
pub const DEFAULT_CONVERSATION_NAME: &str = "Sicc Crypto Alerts";

/// Author shown on every alert message.
pub const DEFAULT_AUTHOR: &str = "Sicc Crypto Bot";

/// Prefix of the trailing timestamp line.
pub const DEFAULT_SIGNATURE: &str = "From Sicc Crypto Bot";

/// Settings shared by the conversation manager and the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertSettings {
    /// Friendly name the target conversation is looked up by
    pub friendly_name: String,
    /// Unique name given to a newly created conversation
    pub unique_name: String,
    /// Messaging-capable number SMS participants are proxied through
    pub proxy_address: String,
    /// Message author
    pub author: String,
    /// Timestamp line prefix
    pub signature: String,
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            friendly_name: DEFAULT_CONVERSATION_NAME.to_string(),
            unique_name: DEFAULT_CONVERSATION_NAME.to_string(),
            proxy_address: String::new(),
            author: DEFAULT_AUTHOR.to_string(),
            signature: DEFAULT_SIGNATURE.to_string(),
        }
    }
}

impl AlertSettings {
    /// Settings for a conversation name (used as both friendly and unique name).
    pub fn new(conversation_name: impl Into<String>, proxy_address: impl Into<String>) -> Self {
        let name = conversation_name.into();
        Self {
            friendly_name: name.clone(),
            unique_name: name,
            proxy_address: proxy_address.into(),
            ..Default::default()
        }
    }
}
