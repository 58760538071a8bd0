//! Application configuration, read once from the process environment.

use sicc_alerts::AlertSettings;
use sicc_core::{ParticipantDirectory, Ticker};
use std::time::Duration;
use thiserror::Error;

pub const TWILIO_ACCOUNT_SID: &str = "TWILIO_ACCOUNT_SID";
pub const TWILIO_AUTH_TOKEN: &str = "TWILIO_AUTH_TOKEN";
pub const TWILIO_PHONE_NUMBER: &str = "TWILIO_PHONE_NUMBER";
/// Comma-separated participant phone numbers in E.164 format.
pub const SICC_PARTICIPANTS: &str = "SICC_PARTICIPANTS";
/// Comma-separated participant names, parallel to `SICC_PARTICIPANTS`.
pub const SICC_PARTICIPANTS_NAMES: &str = "SICC_PARTICIPANTS_NAMES";
pub const MESSARI_API_KEY: &str = "MESSARI_API_KEY";
pub const SICC_TICKERS: &str = "SICC_TICKERS";
pub const SICC_CONVERSATION_NAME: &str = "SICC_CONVERSATION_NAME";
pub const SICC_HTTP_TIMEOUT_SECS: &str = "SICC_HTTP_TIMEOUT_SECS";

const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("You are missing one of the variables you need to send a message: {0} is not set")]
    Missing(&'static str),
    #[error("Invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Application configuration.
#[derive(Clone)]
pub struct AppConfig {
    pub account_sid: String,
    pub auth_token: String,
    /// Deployment's messaging-capable number, used as the SMS proxy address
    pub twilio_number: String,
    /// Configured roster numbers, in configuration order
    pub roster: Vec<String>,
    pub directory: ParticipantDirectory,
    pub messari_api_key: String,
    pub tickers: Vec<Ticker>,
    pub conversation_name: String,
    pub http_timeout: Duration,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("account_sid", &self.account_sid)
            .field("auth_token", &"<redacted>")
            .field("twilio_number", &self.twilio_number)
            .field("roster", &self.roster)
            .field("messari_api_key", &"<redacted>")
            .field("tickers", &self.tickers)
            .field("conversation_name", &self.conversation_name)
            .field("http_timeout", &self.http_timeout)
            .finish()
    }
}

impl AppConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through an arbitrary key lookup.
    ///
    /// Empty values count as missing.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let require = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));

        let account_sid = require(TWILIO_ACCOUNT_SID)?;
        let auth_token = require(TWILIO_AUTH_TOKEN)?;
        let twilio_number = require(TWILIO_PHONE_NUMBER)?;
        let numbers = require(SICC_PARTICIPANTS)?;
        let names = require(SICC_PARTICIPANTS_NAMES)?;
        let messari_api_key = require(MESSARI_API_KEY)?;

        let tickers = match get(SICC_TICKERS) {
            Some(list) => Ticker::parse_list(&list),
            None => Ticker::defaults(),
        };
        if tickers.is_empty() {
            return Err(ConfigError::Invalid {
                name: SICC_TICKERS,
                reason: "no tickers listed".to_string(),
            });
        }

        let http_timeout = match get(SICC_HTTP_TIMEOUT_SECS) {
            Some(value) => {
                let secs = value.trim().parse::<u64>().map_err(|e| ConfigError::Invalid {
                    name: SICC_HTTP_TIMEOUT_SECS,
                    reason: e.to_string(),
                })?;
                if secs == 0 {
                    return Err(ConfigError::Invalid {
                        name: SICC_HTTP_TIMEOUT_SECS,
                        reason: "must be at least 1 second".to_string(),
                    });
                }
                Duration::from_secs(secs)
            }
            None => Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
        };

        let roster = parse_numbers(&numbers);
        let directory = ParticipantDirectory::from_lists(&numbers, &names);

        Ok(Self {
            account_sid,
            auth_token,
            twilio_number,
            roster,
            directory,
            messari_api_key,
            tickers,
            conversation_name: get(SICC_CONVERSATION_NAME)
                .unwrap_or_else(|| sicc_alerts::config::DEFAULT_CONVERSATION_NAME.to_string()),
            http_timeout,
        })
    }

    /// Settings for the conversation manager and dispatcher.
    pub fn alert_settings(&self) -> AlertSettings {
        AlertSettings::new(self.conversation_name.clone(), self.twilio_number.clone())
    }
}

/// Split a comma-separated number list, trimming and skipping empty entries.
pub fn parse_numbers(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
