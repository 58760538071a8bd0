//! Conversation lookup, participant management, and the provider seam.

use crate::config::AlertSettings;
use crate::error::{ConversationError, ConversationResult};
use async_trait::async_trait;
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use sicc_core::ParticipantDirectory;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, error, info, warn};

/// Group conversation resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub sid: String,
    #[serde(default)]
    pub friendly_name: Option<String>,
    #[serde(default)]
    pub unique_name: Option<String>,
}

/// Channel binding of a participant (SMS address and proxy).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagingBinding {
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub proxy_address: Option<String>,
    #[serde(default)]
    pub projected_address: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

/// Participant bound to a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationParticipant {
    pub sid: String,
    #[serde(default)]
    pub identity: Option<String>,
    #[serde(default)]
    pub messaging_binding: Option<MessagingBinding>,
}

impl ConversationParticipant {
    /// Bound phone number: the SMS address, else the projected address.
    pub fn bound_address(&self) -> Option<&str> {
        let binding = self.messaging_binding.as_ref()?;
        binding
            .address
            .as_deref()
            .or(binding.projected_address.as_deref())
    }
}

/// Message posted to a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub sid: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub date_created: Option<String>,
}

/// Trait for messaging providers exposing a conversation API.
#[async_trait]
pub trait ConversationApi: Send + Sync {
    /// List every conversation on the account.
    async fn list_conversations(&self) -> ConversationResult<Vec<Conversation>>;

    /// Create a conversation.
    async fn create_conversation(
        &self,
        friendly_name: &str,
        unique_name: &str,
    ) -> ConversationResult<Conversation>;

    /// Fetch one conversation by SID.
    async fn fetch_conversation(&self, conversation_sid: &str) -> ConversationResult<Conversation>;

    /// Delete a conversation with its participants and messages.
    async fn delete_conversation(&self, conversation_sid: &str) -> ConversationResult<()>;

    /// List every participant of a conversation.
    async fn list_participants(
        &self,
        conversation_sid: &str,
    ) -> ConversationResult<Vec<ConversationParticipant>>;

    /// Bind a phone number as an SMS participant, proxied through `proxy_address`.
    async fn add_sms_participant(
        &self,
        conversation_sid: &str,
        address: &str,
        proxy_address: &str,
    ) -> ConversationResult<ConversationParticipant>;

    /// Add a chat participant identified by `identity` instead of a phone number.
    async fn add_chat_participant(
        &self,
        conversation_sid: &str,
        identity: &str,
    ) -> ConversationResult<ConversationParticipant>;

    /// Unbind a participant.
    async fn remove_participant(
        &self,
        conversation_sid: &str,
        participant_sid: &str,
    ) -> ConversationResult<()>;

    /// Post a message.
    async fn send_message(
        &self,
        conversation_sid: &str,
        author: &str,
        body: &str,
    ) -> ConversationResult<ConversationMessage>;

    /// Most recent messages, newest first.
    async fn list_messages(
        &self,
        conversation_sid: &str,
        limit: u32,
    ) -> ConversationResult<Vec<ConversationMessage>>;
}

/// Outcome of reconciling the configured roster against membership.
#[derive(Debug, Default)]
pub struct RosterReport {
    /// Numbers that were already members
    pub existing: Vec<String>,
    /// Numbers added during this run
    pub added: Vec<String>,
    /// Numbers whose addition failed
    pub failed: Vec<(String, ConversationError)>,
}

impl RosterReport {
    /// True when every configured number is now a member.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Manages the deployment's single target conversation.
pub struct ConversationManager {
    api: Arc<dyn ConversationApi>,
    settings: AlertSettings,
}

impl ConversationManager {
    pub fn new(api: Arc<dyn ConversationApi>, settings: AlertSettings) -> Self {
        Self { api, settings }
    }

    pub fn settings(&self) -> &AlertSettings {
        &self.settings
    }

    /// Find the conversation carrying the configured friendly name.
    pub async fn find(&self) -> ConversationResult<Option<Conversation>> {
        let conversations = self.api.list_conversations().await?;
        debug!(count = conversations.len(), "Listed conversations");

        Ok(conversations
            .into_iter()
            .find(|c| c.friendly_name.as_deref() == Some(self.settings.friendly_name.as_str())))
    }

    /// Find the conversation, failing if it does not exist.
    pub async fn require(&self) -> ConversationResult<Conversation> {
        self.find()
            .await?
            .ok_or_else(|| ConversationError::ConversationNotFound(self.settings.friendly_name.clone()))
    }

    /// Find the conversation, creating it when absent.
    pub async fn find_or_create(&self) -> ConversationResult<Conversation> {
        if let Some(conversation) = self.find().await? {
            info!(sid = %conversation.sid, name = %self.settings.friendly_name, "Found conversation");
            return Ok(conversation);
        }

        let conversation = self
            .api
            .create_conversation(&self.settings.friendly_name, &self.settings.unique_name)
            .await?;
        info!(sid = %conversation.sid, name = %self.settings.friendly_name, "Created conversation");
        Ok(conversation)
    }

    /// Fetch a conversation by SID.
    pub async fn fetch(&self, conversation_sid: &str) -> ConversationResult<Conversation> {
        self.api.fetch_conversation(conversation_sid).await
    }

    /// Delete a conversation. It must exist.
    pub async fn delete(&self, conversation_sid: &str) -> ConversationResult<Conversation> {
        let conversation = self.api.fetch_conversation(conversation_sid).await?;
        self.api.delete_conversation(conversation_sid).await?;
        info!(
            sid = %conversation.sid,
            name = conversation.friendly_name.as_deref().unwrap_or("-"),
            "Deleted conversation"
        );
        Ok(conversation)
    }

    /// Add a chat (identity) participant, e.g. a bot account.
    pub async fn add_chat_participant(
        &self,
        conversation_sid: &str,
        identity: &str,
    ) -> ConversationResult<ConversationParticipant> {
        let participant = self
            .api
            .add_chat_participant(conversation_sid, identity)
            .await?;
        info!(
            identity = %identity,
            participant = %participant.sid,
            conversation = %conversation_sid,
            "Added chat participant"
        );
        Ok(participant)
    }

    /// List the conversation's participants.
    pub async fn participants(
        &self,
        conversation_sid: &str,
    ) -> ConversationResult<Vec<ConversationParticipant>> {
        self.api.list_participants(conversation_sid).await
    }

    /// Log membership as `<number> => <name>`, naming members from the directory.
    pub fn log_membership(
        &self,
        participants: &[ConversationParticipant],
        directory: &ParticipantDirectory,
    ) {
        info!("Current conversation participants:");
        for participant in participants {
            let address = participant.bound_address();
            let name = address
                .and_then(|a| directory.name_for(a))
                .or(participant.identity.as_deref())
                .unwrap_or("unknown");
            info!("  {} => {}", address.unwrap_or("<unbound>"), name);
        }
    }

    /// Bind a phone number as an SMS participant.
    pub async fn add_sms_participant(
        &self,
        conversation_sid: &str,
        phone_number: &str,
    ) -> ConversationResult<ConversationParticipant> {
        self.api
            .add_sms_participant(conversation_sid, phone_number, &self.settings.proxy_address)
            .await
    }

    /// Add every roster number that is not already a member.
    ///
    /// Additions run concurrently; each failure is recorded, and existing
    /// members are never re-added.
    pub async fn reconcile_roster(
        &self,
        conversation_sid: &str,
        roster: &[String],
        directory: &ParticipantDirectory,
    ) -> ConversationResult<RosterReport> {
        let participants = self.api.list_participants(conversation_sid).await?;
        self.log_membership(&participants, directory);

        let members: HashSet<&str> = participants
            .iter()
            .filter_map(ConversationParticipant::bound_address)
            .collect();

        let mut report = RosterReport::default();
        let mut seen = HashSet::new();
        let mut missing = Vec::new();
        for number in roster {
            if !seen.insert(number.as_str()) {
                continue;
            }
            if members.contains(number.as_str()) {
                report.existing.push(number.clone());
            } else {
                missing.push(number.as_str());
            }
        }

        let additions = missing.into_iter().map(|number| async move {
            (
                number.to_string(),
                self.add_sms_participant(conversation_sid, number).await,
            )
        });

        for (number, result) in join_all(additions).await {
            match result {
                Ok(participant) => {
                    info!(
                        number = %number,
                        participant = %participant.sid,
                        conversation = %conversation_sid,
                        "Added participant"
                    );
                    report.added.push(number);
                }
                Err(e) => {
                    error!(number = %number, error = %e, "Failed to add participant");
                    report.failed.push((number, e));
                }
            }
        }

        Ok(report)
    }

    /// Unbind the participant whose bound address is `phone_number`.
    ///
    /// Returns `Ok(false)` when no participant matches.
    pub async fn remove_participant(
        &self,
        conversation_sid: &str,
        phone_number: &str,
    ) -> ConversationResult<bool> {
        let participants = self.api.list_participants(conversation_sid).await?;

        let Some(participant) = participants
            .iter()
            .find(|p| p.bound_address() == Some(phone_number))
        else {
            warn!(
                number = %phone_number,
                conversation = %conversation_sid,
                "Could not find SMS participant to remove"
            );
            return Ok(false);
        };

        self.api
            .remove_participant(conversation_sid, &participant.sid)
            .await?;
        info!(
            number = %phone_number,
            participant = %participant.sid,
            conversation = %conversation_sid,
            "Removed participant"
        );
        Ok(true)
    }

    /// Remove several numbers concurrently, one result per number.
    pub async fn remove_participants(
        &self,
        conversation_sid: &str,
        phone_numbers: &[String],
    ) -> Vec<(String, ConversationResult<bool>)> {
        let removals = phone_numbers.iter().map(|number| async move {
            (
                number.clone(),
                self.remove_participant(conversation_sid, number).await,
            )
        });
        join_all(removals).await
    }

    /// Most recent messages, newest first.
    pub async fn recent_messages(
        &self,
        conversation_sid: &str,
        limit: u32,
    ) -> ConversationResult<Vec<ConversationMessage>> {
        self.api.list_messages(conversation_sid, limit).await
    }
}

/// Call recorded by [`MockConversationApi`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    ListConversations,
    CreateConversation {
        friendly_name: String,
        unique_name: String,
    },
    FetchConversation(String),
    DeleteConversation(String),
    ListParticipants(String),
    AddSmsParticipant {
        conversation_sid: String,
        address: String,
        proxy_address: String,
    },
    AddChatParticipant {
        conversation_sid: String,
        identity: String,
    },
    RemoveParticipant {
        conversation_sid: String,
        participant_sid: String,
    },
    SendMessage {
        conversation_sid: String,
        author: String,
        body: String,
    },
    ListMessages {
        conversation_sid: String,
        limit: u32,
    },
}

#[derive(Debug, Default)]
struct MockState {
    conversations: Vec<Conversation>,
    participants: HashMap<String, Vec<ConversationParticipant>>,
    messages: HashMap<String, Vec<ConversationMessage>>,
    failing_addresses: HashSet<String>,
    fail_send: bool,
    calls: Vec<MockCall>,
    next_id: u64,
}

impl MockState {
    fn next_sid(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}{:032}", prefix, self.next_id)
    }

    fn conversation(&self, sid: &str) -> ConversationResult<Conversation> {
        self.conversations
            .iter()
            .find(|c| c.sid == sid)
            .cloned()
            .ok_or_else(|| ConversationError::Api {
                status: 404,
                code: Some(20404),
                message: format!("The requested resource /Conversations/{} was not found", sid),
            })
    }
}

/// In-memory conversation API that records every call.
#[derive(Debug, Default)]
pub struct MockConversationApi {
    state: Mutex<MockState>,
}

impl MockConversationApi {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seed an existing conversation.
    pub fn with_conversation(self, sid: &str, friendly_name: &str) -> Self {
        self.state().conversations.push(Conversation {
            sid: sid.to_string(),
            friendly_name: Some(friendly_name.to_string()),
            unique_name: Some(friendly_name.to_string()),
        });
        self
    }

    /// Seed an SMS participant bound to `address`.
    pub fn with_participant(self, conversation_sid: &str, participant_sid: &str, address: &str) -> Self {
        self.state()
            .participants
            .entry(conversation_sid.to_string())
            .or_default()
            .push(ConversationParticipant {
                sid: participant_sid.to_string(),
                identity: None,
                messaging_binding: Some(MessagingBinding {
                    address: Some(address.to_string()),
                    ..Default::default()
                }),
            });
        self
    }

    /// Reject additions of `address`.
    pub fn failing_address(self, address: &str) -> Self {
        self.state().failing_addresses.insert(address.to_string());
        self
    }

    /// Reject every message send.
    pub fn failing_send(self) -> Self {
        self.state().fail_send = true;
        self
    }

    /// Calls made so far, in order.
    pub fn calls(&self) -> Vec<MockCall> {
        self.state().calls.clone()
    }

    /// Number of recorded calls matching `predicate`.
    pub fn count_calls(&self, predicate: impl Fn(&MockCall) -> bool) -> usize {
        self.state().calls.iter().filter(|c| predicate(c)).count()
    }

    /// Messages posted to a conversation, oldest first.
    pub fn sent_messages(&self, conversation_sid: &str) -> Vec<ConversationMessage> {
        self.state()
            .messages
            .get(conversation_sid)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl ConversationApi for MockConversationApi {
    async fn list_conversations(&self) -> ConversationResult<Vec<Conversation>> {
        let mut state = self.state();
        state.calls.push(MockCall::ListConversations);
        Ok(state.conversations.clone())
    }

    async fn create_conversation(
        &self,
        friendly_name: &str,
        unique_name: &str,
    ) -> ConversationResult<Conversation> {
        let mut state = self.state();
        state.calls.push(MockCall::CreateConversation {
            friendly_name: friendly_name.to_string(),
            unique_name: unique_name.to_string(),
        });
        let conversation = Conversation {
            sid: state.next_sid("CH"),
            friendly_name: Some(friendly_name.to_string()),
            unique_name: Some(unique_name.to_string()),
        };
        state.conversations.push(conversation.clone());
        Ok(conversation)
    }

    async fn fetch_conversation(&self, conversation_sid: &str) -> ConversationResult<Conversation> {
        let mut state = self.state();
        state
            .calls
            .push(MockCall::FetchConversation(conversation_sid.to_string()));
        state.conversation(conversation_sid)
    }

    async fn delete_conversation(&self, conversation_sid: &str) -> ConversationResult<()> {
        let mut state = self.state();
        state
            .calls
            .push(MockCall::DeleteConversation(conversation_sid.to_string()));
        state.conversation(conversation_sid)?;
        state.conversations.retain(|c| c.sid != conversation_sid);
        state.participants.remove(conversation_sid);
        state.messages.remove(conversation_sid);
        Ok(())
    }

    async fn list_participants(
        &self,
        conversation_sid: &str,
    ) -> ConversationResult<Vec<ConversationParticipant>> {
        let mut state = self.state();
        state
            .calls
            .push(MockCall::ListParticipants(conversation_sid.to_string()));
        Ok(state
            .participants
            .get(conversation_sid)
            .cloned()
            .unwrap_or_default())
    }

    async fn add_sms_participant(
        &self,
        conversation_sid: &str,
        address: &str,
        proxy_address: &str,
    ) -> ConversationResult<ConversationParticipant> {
        let mut state = self.state();
        state.calls.push(MockCall::AddSmsParticipant {
            conversation_sid: conversation_sid.to_string(),
            address: address.to_string(),
            proxy_address: proxy_address.to_string(),
        });
        if state.failing_addresses.contains(address) {
            return Err(ConversationError::Api {
                status: 400,
                code: Some(50407),
                message: format!("Invalid messaging binding address {}", address),
            });
        }
        let participant = ConversationParticipant {
            sid: state.next_sid("MB"),
            identity: None,
            messaging_binding: Some(MessagingBinding {
                address: Some(address.to_string()),
                proxy_address: Some(proxy_address.to_string()),
                projected_address: None,
                kind: Some("sms".to_string()),
            }),
        };
        state
            .participants
            .entry(conversation_sid.to_string())
            .or_default()
            .push(participant.clone());
        Ok(participant)
    }

    async fn add_chat_participant(
        &self,
        conversation_sid: &str,
        identity: &str,
    ) -> ConversationResult<ConversationParticipant> {
        let mut state = self.state();
        state.calls.push(MockCall::AddChatParticipant {
            conversation_sid: conversation_sid.to_string(),
            identity: identity.to_string(),
        });
        let participant = ConversationParticipant {
            sid: state.next_sid("MB"),
            identity: Some(identity.to_string()),
            messaging_binding: None,
        };
        state
            .participants
            .entry(conversation_sid.to_string())
            .or_default()
            .push(participant.clone());
        Ok(participant)
    }

    async fn remove_participant(
        &self,
        conversation_sid: &str,
        participant_sid: &str,
    ) -> ConversationResult<()> {
        let mut state = self.state();
        state.calls.push(MockCall::RemoveParticipant {
            conversation_sid: conversation_sid.to_string(),
            participant_sid: participant_sid.to_string(),
        });
        if let Some(participants) = state.participants.get_mut(conversation_sid) {
            participants.retain(|p| p.sid != participant_sid);
        }
        Ok(())
    }

    async fn send_message(
        &self,
        conversation_sid: &str,
        author: &str,
        body: &str,
    ) -> ConversationResult<ConversationMessage> {
        let mut state = self.state();
        state.calls.push(MockCall::SendMessage {
            conversation_sid: conversation_sid.to_string(),
            author: author.to_string(),
            body: body.to_string(),
        });
        if state.fail_send {
            return Err(ConversationError::Http("connection reset".to_string()));
        }
        let message = ConversationMessage {
            sid: state.next_sid("IM"),
            author: Some(author.to_string()),
            body: Some(body.to_string()),
            date_created: None,
        };
        state
            .messages
            .entry(conversation_sid.to_string())
            .or_default()
            .push(message.clone());
        Ok(message)
    }

    async fn list_messages(
        &self,
        conversation_sid: &str,
        limit: u32,
    ) -> ConversationResult<Vec<ConversationMessage>> {
        let mut state = self.state();
        state.calls.push(MockCall::ListMessages {
            conversation_sid: conversation_sid.to_string(),
            limit,
        });
        let mut messages = state
            .messages
            .get(conversation_sid)
            .cloned()
            .unwrap_or_default();
        messages.reverse();
        messages.truncate(limit as usize);
        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const CONV: &str = "CH00000000000000000000000000000001";

    fn manager(api: Arc<MockConversationApi>) -> ConversationManager {
        ConversationManager::new(api, AlertSettings::new("Sicc Crypto Alerts", "+15550000000"))
    }

    fn is_create(call: &MockCall) -> bool {
        matches!(call, MockCall::CreateConversation { .. })
    }

    fn is_add(call: &MockCall) -> bool {
        matches!(call, MockCall::AddSmsParticipant { .. })
    }

    #[test]
    fn test_bound_address_fallback() {
        let mut participant = ConversationParticipant {
            sid: "MB1".to_string(),
            identity: Some("bot".to_string()),
            messaging_binding: None,
        };
        assert_eq!(participant.bound_address(), None);

        participant.messaging_binding = Some(MessagingBinding {
            projected_address: Some("+15551112222".to_string()),
            ..Default::default()
        });
        assert_eq!(participant.bound_address(), Some("+15551112222"));

        participant.messaging_binding = Some(MessagingBinding {
            address: Some("+15553334444".to_string()),
            projected_address: Some("+15551112222".to_string()),
            ..Default::default()
        });
        assert_eq!(participant.bound_address(), Some("+15553334444"));
    }

    #[test]
    fn test_participant_deserialize() {
        let json = r#"{
            "sid": "MB123",
            "identity": null,
            "messaging_binding": {"type": "sms", "address": "+15551112222", "proxy_address": "+15550000000"}
        }"#;
        let participant: ConversationParticipant = serde_json::from_str(json).unwrap();
        assert_eq!(participant.bound_address(), Some("+15551112222"));
        assert_eq!(
            participant.messaging_binding.unwrap().kind.as_deref(),
            Some("sms")
        );
    }

    #[tokio::test]
    async fn test_find_or_create_returns_existing() {
        let api = Arc::new(
            MockConversationApi::new()
                .with_conversation("CHother", "Other Chat")
                .with_conversation(CONV, "Sicc Crypto Alerts"),
        );
        let conversation = manager(api.clone()).find_or_create().await.unwrap();

        assert_eq!(conversation.sid, CONV);
        assert_eq!(api.count_calls(is_create), 0);
    }

    #[tokio::test]
    async fn test_find_or_create_creates_once() {
        let api = Arc::new(MockConversationApi::new().with_conversation("CHother", "Other Chat"));
        let conversation = manager(api.clone()).find_or_create().await.unwrap();

        assert!(conversation.sid.starts_with("CH"));
        assert_eq!(api.count_calls(is_create), 1);
        assert!(api.calls().contains(&MockCall::CreateConversation {
            friendly_name: "Sicc Crypto Alerts".to_string(),
            unique_name: "Sicc Crypto Alerts".to_string(),
        }));

        // A second run finds the created conversation instead of duplicating it
        let again = manager(api.clone()).find_or_create().await.unwrap();
        assert_eq!(again.sid, conversation.sid);
        assert_eq!(api.count_calls(is_create), 1);
    }

    #[tokio::test]
    async fn test_require_missing_conversation() {
        let api = Arc::new(MockConversationApi::new());
        let result = manager(api.clone()).require().await;
        assert!(matches!(
            result,
            Err(ConversationError::ConversationNotFound(name)) if name == "Sicc Crypto Alerts"
        ));
        assert_eq!(api.count_calls(is_create), 0);
    }

    #[tokio::test]
    async fn test_reconcile_adds_only_missing() {
        let api = Arc::new(
            MockConversationApi::new()
                .with_conversation(CONV, "Sicc Crypto Alerts")
                .with_participant(CONV, "MB1", "+15553334444"),
        );
        let roster = vec![
            "+15551112222".to_string(),
            "+15553334444".to_string(),
            "+15555556666".to_string(),
        ];
        let directory = ParticipantDirectory::from_lists(&roster.join(","), "Alice,Bob,Carol");

        let report = manager(api.clone())
            .reconcile_roster(CONV, &roster, &directory)
            .await
            .unwrap();

        assert_eq!(api.count_calls(is_add), 2);
        assert_eq!(report.existing, vec!["+15553334444".to_string()]);
        let mut added = report.added.clone();
        added.sort();
        assert_eq!(added, vec!["+15551112222".to_string(), "+15555556666".to_string()]);
        assert!(report.is_complete());
    }

    #[tokio::test]
    async fn test_reconcile_uses_proxy_address() {
        let api = Arc::new(MockConversationApi::new());
        let roster = vec!["+15551112222".to_string()];
        manager(api.clone())
            .reconcile_roster(CONV, &roster, &ParticipantDirectory::default())
            .await
            .unwrap();

        assert!(api.calls().contains(&MockCall::AddSmsParticipant {
            conversation_sid: CONV.to_string(),
            address: "+15551112222".to_string(),
            proxy_address: "+15550000000".to_string(),
        }));
    }

    #[tokio::test]
    async fn test_reconcile_is_idempotent() {
        let api = Arc::new(MockConversationApi::new());
        let roster = vec!["+15551112222".to_string(), "+15553334444".to_string()];
        let manager = manager(api.clone());
        let directory = ParticipantDirectory::default();

        manager.reconcile_roster(CONV, &roster, &directory).await.unwrap();
        let second = manager.reconcile_roster(CONV, &roster, &directory).await.unwrap();

        assert_eq!(api.count_calls(is_add), 2);
        assert!(second.added.is_empty());
        assert_eq!(second.existing.len(), 2);
    }

    #[tokio::test]
    async fn test_reconcile_skips_duplicate_roster_numbers() {
        let api = Arc::new(MockConversationApi::new());
        let roster = vec!["+15551112222".to_string(), "+15551112222".to_string()];
        manager(api.clone())
            .reconcile_roster(CONV, &roster, &ParticipantDirectory::default())
            .await
            .unwrap();
        assert_eq!(api.count_calls(is_add), 1);
    }

    #[tokio::test]
    async fn test_reconcile_records_each_failure() {
        let api = Arc::new(MockConversationApi::new().failing_address("+15559999999"));
        let roster = vec![
            "+15551112222".to_string(),
            "+15559999999".to_string(),
            "+15553334444".to_string(),
        ];
        let report = manager(api.clone())
            .reconcile_roster(CONV, &roster, &ParticipantDirectory::default())
            .await
            .unwrap();

        assert_eq!(api.count_calls(is_add), 3);
        assert_eq!(report.added.len(), 2);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "+15559999999");
        assert!(!report.is_complete());
    }

    #[tokio::test]
    async fn test_remove_participant_match() {
        let api = Arc::new(
            MockConversationApi::new()
                .with_participant(CONV, "MB1", "+15551112222")
                .with_participant(CONV, "MB2", "+15553334444"),
        );
        let removed = manager(api.clone())
            .remove_participant(CONV, "+15553334444")
            .await
            .unwrap();

        assert!(removed);
        assert!(api.calls().contains(&MockCall::RemoveParticipant {
            conversation_sid: CONV.to_string(),
            participant_sid: "MB2".to_string(),
        }));
        let remaining = api.list_participants(CONV).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].sid, "MB1");
    }

    #[tokio::test]
    async fn test_remove_participant_no_match() {
        let api = Arc::new(MockConversationApi::new().with_participant(CONV, "MB1", "+15551112222"));
        let removed = manager(api.clone())
            .remove_participant(CONV, "+15550001111")
            .await
            .unwrap();

        assert!(!removed);
        assert_eq!(
            api.count_calls(|c| matches!(c, MockCall::RemoveParticipant { .. })),
            0
        );
    }

    #[tokio::test]
    async fn test_remove_participants_reports_each() {
        let api = Arc::new(MockConversationApi::new().with_participant(CONV, "MB1", "+15551112222"));
        let numbers = vec!["+15551112222".to_string(), "+15550001111".to_string()];
        let results = manager(api).remove_participants(CONV, &numbers).await;

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, "+15551112222");
        assert!(matches!(results[0].1, Ok(true)));
        assert!(matches!(results[1].1, Ok(false)));
    }

    #[tokio::test]
    async fn test_fetch_conversation_by_sid() {
        let api = Arc::new(MockConversationApi::new().with_conversation(CONV, "Sicc Crypto Alerts"));
        let conversation = manager(api.clone()).fetch(CONV).await.unwrap();
        assert_eq!(conversation.friendly_name.as_deref(), Some("Sicc Crypto Alerts"));

        let missing = manager(api).fetch("CHmissing").await;
        assert!(matches!(
            missing,
            Err(ConversationError::Api { status: 404, .. })
        ));
    }

    #[tokio::test]
    async fn test_delete_conversation() {
        let api = Arc::new(
            MockConversationApi::new()
                .with_conversation(CONV, "Sicc Crypto Alerts")
                .with_participant(CONV, "MB1", "+15551112222"),
        );
        let manager = manager(api.clone());
        let deleted = manager.delete(CONV).await.unwrap();

        assert_eq!(deleted.sid, CONV);
        assert!(api.calls().contains(&MockCall::DeleteConversation(CONV.to_string())));
        assert!(manager.find().await.unwrap().is_none());
        assert!(api.list_participants(CONV).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_missing_conversation_fails() {
        let api = Arc::new(MockConversationApi::new());
        let result = manager(api.clone()).delete(CONV).await;

        assert!(matches!(result, Err(ConversationError::Api { status: 404, .. })));
        assert_eq!(
            api.count_calls(|c| matches!(c, MockCall::DeleteConversation(_))),
            0
        );
    }

    #[tokio::test]
    async fn test_add_chat_participant() {
        let api = Arc::new(MockConversationApi::new().with_conversation(CONV, "Sicc Crypto Alerts"));
        let participant = manager(api.clone())
            .add_chat_participant(CONV, "sicc-bot")
            .await
            .unwrap();

        assert_eq!(participant.identity.as_deref(), Some("sicc-bot"));
        assert_eq!(participant.bound_address(), None);
        assert!(api.calls().contains(&MockCall::AddChatParticipant {
            conversation_sid: CONV.to_string(),
            identity: "sicc-bot".to_string(),
        }));
        // Chat participants are not SMS members
        assert_eq!(api.count_calls(is_add), 0);
    }

    #[tokio::test]
    async fn test_recent_messages_newest_first() {
        let api = Arc::new(MockConversationApi::new());
        api.send_message(CONV, "bot", "first").await.unwrap();
        api.send_message(CONV, "bot", "second").await.unwrap();
        api.send_message(CONV, "bot", "third").await.unwrap();

        let messages = manager(api).recent_messages(CONV, 2).await.unwrap();
        let bodies: Vec<&str> = messages.iter().filter_map(|m| m.body.as_deref()).collect();
        assert_eq!(bodies, vec!["third", "second"]);
    }
}
