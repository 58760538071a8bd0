//! Bot workflows: full alert run plus conversation maintenance.

use crate::config::AppConfig;
use sicc_alerts::{
    AlertDispatcher, Conversation, ConversationApi, ConversationError, ConversationManager,
    ConversationMessage, ConversationParticipant, DispatchError, DispatchReport, FetchPolicy,
    RosterReport, TwilioClient,
};
use std::collections::HashSet;
use sicc_feeds::{FeedError, MarketDataSource, MessariSource};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Error, Debug)]
pub enum CommandError {
    #[error(transparent)]
    Conversation(#[from] ConversationError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error(transparent)]
    Feed(#[from] FeedError),
    #[error("Failed to add participants: {}", .0.join(", "))]
    IncompleteRoster(Vec<String>),
    #[error("Failed to remove participants: {}", .0.join(", "))]
    RemovalFailed(Vec<String>),
}

/// Options shared by the commands that dispatch an alert.
#[derive(Debug, Clone, Copy, Default)]
pub struct DispatchOptions {
    pub dry_run: bool,
    pub policy: FetchPolicy,
}

/// Wired-up clients and configuration for one process run.
pub struct BotContext {
    config: AppConfig,
    api: Arc<dyn ConversationApi>,
    source: Arc<dyn MarketDataSource>,
    manager: ConversationManager,
}

impl BotContext {
    /// Build the Twilio and Messari clients from configuration.
    pub fn from_config(config: AppConfig) -> Result<Self, CommandError> {
        let api = TwilioClient::new(
            config.account_sid.clone(),
            config.auth_token.clone(),
            config.http_timeout,
        )?;
        let source = MessariSource::new(config.messari_api_key.clone(), config.http_timeout)?;
        Ok(Self::with_clients(config, Arc::new(api), Arc::new(source)))
    }

    /// Build a context around existing clients.
    pub fn with_clients(
        config: AppConfig,
        api: Arc<dyn ConversationApi>,
        source: Arc<dyn MarketDataSource>,
    ) -> Self {
        let manager = ConversationManager::new(api.clone(), config.alert_settings());
        Self {
            config,
            api,
            source,
            manager,
        }
    }

    fn dispatcher(&self, options: DispatchOptions) -> AlertDispatcher {
        AlertDispatcher::new(
            self.source.clone(),
            self.api.clone(),
            self.manager.settings().clone(),
            self.config.tickers.clone(),
        )
        .with_policy(options.policy)
        .with_dry_run(options.dry_run)
    }

    /// Full run: resolve the conversation, reconcile the roster, send the alert.
    ///
    /// A dry run only looks the conversation up; it never creates it or
    /// changes membership.
    pub async fn send(&self, options: DispatchOptions) -> Result<DispatchReport, CommandError> {
        if options.dry_run {
            let sid = match self.manager.find().await? {
                Some(conversation) => conversation.sid,
                None => {
                    info!("Dry run: conversation does not exist yet and was not created");
                    String::new()
                }
            };
            return Ok(self.dispatcher(options).dispatch(&sid).await?);
        }

        let conversation = self.manager.find_or_create().await?;

        let report = self
            .manager
            .reconcile_roster(&conversation.sid, &self.config.roster, &self.config.directory)
            .await?;
        ensure_complete(&report)?;
        info!(
            added = report.added.len(),
            existing = report.existing.len(),
            "Participant list updated"
        );

        Ok(self.dispatcher(options).dispatch(&conversation.sid).await?)
    }

    /// Send an alert to the existing conversation without touching membership.
    pub async fn test(&self, options: DispatchOptions) -> Result<DispatchReport, CommandError> {
        let conversation = self.manager.require().await?;
        Ok(self.dispatcher(options).dispatch(&conversation.sid).await?)
    }

    /// Add numbers (default: the configured roster) to the existing conversation.
    pub async fn add(&self, numbers: &[String]) -> Result<RosterReport, CommandError> {
        let conversation = self.manager.require().await?;
        let numbers = self.resolve_numbers(numbers);

        let report = self
            .manager
            .reconcile_roster(&conversation.sid, &numbers, &self.config.directory)
            .await?;
        ensure_complete(&report)?;
        info!(
            added = report.added.len(),
            skipped = report.existing.len(),
            "Participants added and list has been updated"
        );
        Ok(report)
    }

    /// Remove numbers (default: the configured roster) from the existing conversation.
    ///
    /// Returns how many participants were removed; numbers with no matching
    /// participant are logged and skipped.
    pub async fn remove(&self, numbers: &[String]) -> Result<usize, CommandError> {
        let conversation = self.manager.require().await?;
        let numbers = self.resolve_numbers(numbers);

        let mut removed = 0;
        let mut failed = Vec::new();
        for (number, result) in self
            .manager
            .remove_participants(&conversation.sid, &numbers)
            .await
        {
            match result {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(e) => {
                    error!(number = %number, error = %e, "Failed to remove participant");
                    failed.push(number);
                }
            }
        }

        if !failed.is_empty() {
            return Err(CommandError::RemovalFailed(failed));
        }
        info!(removed, "Participants have been removed from the conversation");
        Ok(removed)
    }

    /// Log and return the current membership, warning about configured
    /// participants who are not members.
    pub async fn participants(&self) -> Result<Vec<ConversationParticipant>, CommandError> {
        let conversation = self.manager.require().await?;
        let participants = self.manager.participants(&conversation.sid).await?;
        self.manager
            .log_membership(&participants, &self.config.directory);

        let members: HashSet<&str> = participants
            .iter()
            .filter_map(ConversationParticipant::bound_address)
            .collect();
        for number in self.config.directory.phone_numbers() {
            if !members.contains(number) {
                warn!(
                    number = %number,
                    name = self.config.directory.name_for(number).unwrap_or("unknown"),
                    "Configured participant is not a member"
                );
            }
        }
        Ok(participants)
    }

    /// Add a chat participant by identity to the existing conversation.
    pub async fn add_identity(&self, identity: &str) -> Result<ConversationParticipant, CommandError> {
        let conversation = self.manager.require().await?;
        Ok(self
            .manager
            .add_chat_participant(&conversation.sid, identity)
            .await?)
    }

    /// Delete a conversation by SID, or the configured one when no SID is given.
    pub async fn delete_conversation(
        &self,
        sid: Option<&str>,
    ) -> Result<Conversation, CommandError> {
        let sid = match sid {
            Some(sid) => sid.to_string(),
            None => self.manager.require().await?.sid,
        };
        Ok(self.manager.delete(&sid).await?)
    }

    /// Log and return the most recent messages.
    pub async fn messages(&self, limit: u32) -> Result<Vec<ConversationMessage>, CommandError> {
        let conversation = self.manager.require().await?;
        let messages = self
            .manager
            .recent_messages(&conversation.sid, limit)
            .await?;
        for message in &messages {
            info!(
                sid = %message.sid,
                author = message.author.as_deref().unwrap_or("-"),
                created = message.date_created.as_deref().unwrap_or("-"),
                "Message"
            );
        }
        Ok(messages)
    }

    /// Command-line targets as phone numbers; no targets means the whole roster.
    fn resolve_numbers(&self, targets: &[String]) -> Vec<String> {
        if targets.is_empty() {
            return self.config.roster.clone();
        }
        targets
            .iter()
            .map(|target| {
                self.config
                    .directory
                    .number_for(target)
                    .map(str::to_string)
                    .unwrap_or_else(|| target.clone())
            })
            .collect()
    }
}

fn ensure_complete(report: &RosterReport) -> Result<(), CommandError> {
    if report.is_complete() {
        return Ok(());
    }
    Err(CommandError::IncompleteRoster(
        report.failed.iter().map(|(number, _)| number.clone()).collect(),
    ))
}
