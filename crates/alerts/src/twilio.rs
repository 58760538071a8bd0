//! Twilio Conversations REST client.
//!
//! Follows https://www.twilio.com/docs/conversations/api. Requests use HTTP
//! basic auth (account SID, auth token) and form-encoded bodies.

use crate::conversation::{
    Conversation, ConversationApi, ConversationMessage, ConversationParticipant,
};
use crate::error::{ConversationError, ConversationResult};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

const PAGE_SIZE: &str = "50";

#[derive(Debug, Deserialize)]
struct PageMeta {
    #[serde(default)]
    next_page_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ConversationPage {
    conversations: Vec<Conversation>,
    meta: PageMeta,
}

#[derive(Debug, Deserialize)]
struct ParticipantPage {
    participants: Vec<ConversationParticipant>,
    meta: PageMeta,
}

#[derive(Debug, Deserialize)]
struct MessagePage {
    messages: Vec<ConversationMessage>,
}

/// Error body returned by the Twilio API on non-2xx responses.
#[derive(Debug, Deserialize)]
struct TwilioErrorBody {
    #[serde(default)]
    code: Option<u64>,
    #[serde(default)]
    message: Option<String>,
}

/// Conversation API backed by Twilio.
pub struct TwilioClient {
    http_client: reqwest::Client,
    account_sid: String,
    auth_token: String,
    base_url: String,
}

impl std::fmt::Debug for TwilioClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TwilioClient")
            .field("account_sid", &self.account_sid)
            .field("auth_token", &"<redacted>")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl TwilioClient {
    pub const BASE_URL: &'static str = "https://conversations.twilio.com/v1";

    /// Create a client with a per-request timeout.
    pub fn new(
        account_sid: impl Into<String>,
        auth_token: impl Into<String>,
        timeout: Duration,
    ) -> ConversationResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConversationError::Client(e.to_string()))?;

        Ok(Self {
            http_client,
            account_sid: account_sid.into(),
            auth_token: auth_token.into(),
            base_url: Self::BASE_URL.to_string(),
        })
    }

    /// Point the client at a different host (e.g., a local stub).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn conversations_url(&self) -> String {
        format!("{}/Conversations", self.base_url)
    }

    fn conversation_url(&self, conversation_sid: &str) -> String {
        format!("{}/Conversations/{}", self.base_url, conversation_sid)
    }

    fn participants_url(&self, conversation_sid: &str) -> String {
        format!("{}/Conversations/{}/Participants", self.base_url, conversation_sid)
    }

    fn messages_url(&self, conversation_sid: &str) -> String {
        format!("{}/Conversations/{}/Messages", self.base_url, conversation_sid)
    }

    /// Turn a non-success response into an API error.
    async fn check(response: reqwest::Response) -> ConversationResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        let body: Option<TwilioErrorBody> = serde_json::from_str(&text).ok();
        let (code, message) = match body {
            Some(body) => (body.code, body.message.unwrap_or(text)),
            None => (None, text),
        };

        Err(ConversationError::Api {
            status: status.as_u16(),
            code,
            message,
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> ConversationResult<T> {
        debug!(url = %url, "Twilio: GET");
        let response = self
            .http_client
            .get(url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .query(query)
            .send()
            .await?;
        Ok(Self::check(response).await?.json::<T>().await?)
    }

    async fn post_form<T: DeserializeOwned>(
        &self,
        url: &str,
        params: &[(&str, &str)],
    ) -> ConversationResult<T> {
        debug!(url = %url, "Twilio: POST");
        let response = self
            .http_client
            .post(url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(params)
            .send()
            .await?;
        Ok(Self::check(response).await?.json::<T>().await?)
    }

    async fn delete(&self, url: &str) -> ConversationResult<()> {
        debug!(url = %url, "Twilio: DELETE");
        let response = self
            .http_client
            .delete(url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }
}

#[async_trait]
impl ConversationApi for TwilioClient {
    async fn list_conversations(&self) -> ConversationResult<Vec<Conversation>> {
        let mut conversations = Vec::new();
        let mut page: ConversationPage = self
            .get_json(&self.conversations_url(), &[("PageSize", PAGE_SIZE)])
            .await?;

        loop {
            conversations.append(&mut page.conversations);
            match page.meta.next_page_url.take() {
                Some(next) => page = self.get_json(&next, &[]).await?,
                None => break,
            }
        }

        Ok(conversations)
    }

    async fn create_conversation(
        &self,
        friendly_name: &str,
        unique_name: &str,
    ) -> ConversationResult<Conversation> {
        self.post_form(
            &self.conversations_url(),
            &[("FriendlyName", friendly_name), ("UniqueName", unique_name)],
        )
        .await
    }

    async fn fetch_conversation(&self, conversation_sid: &str) -> ConversationResult<Conversation> {
        self.get_json(&self.conversation_url(conversation_sid), &[])
            .await
    }

    async fn delete_conversation(&self, conversation_sid: &str) -> ConversationResult<()> {
        self.delete(&self.conversation_url(conversation_sid)).await
    }

    async fn list_participants(
        &self,
        conversation_sid: &str,
    ) -> ConversationResult<Vec<ConversationParticipant>> {
        let mut participants = Vec::new();
        let mut page: ParticipantPage = self
            .get_json(
                &self.participants_url(conversation_sid),
                &[("PageSize", PAGE_SIZE)],
            )
            .await?;

        loop {
            participants.append(&mut page.participants);
            match page.meta.next_page_url.take() {
                Some(next) => page = self.get_json(&next, &[]).await?,
                None => break,
            }
        }

        Ok(participants)
    }

    async fn add_sms_participant(
        &self,
        conversation_sid: &str,
        address: &str,
        proxy_address: &str,
    ) -> ConversationResult<ConversationParticipant> {
        self.post_form(
            &self.participants_url(conversation_sid),
            &[
                ("MessagingBinding.Address", address),
                ("MessagingBinding.ProxyAddress", proxy_address),
            ],
        )
        .await
    }

    async fn add_chat_participant(
        &self,
        conversation_sid: &str,
        identity: &str,
    ) -> ConversationResult<ConversationParticipant> {
        self.post_form(
            &self.participants_url(conversation_sid),
            &[("Identity", identity)],
        )
        .await
    }

    async fn remove_participant(
        &self,
        conversation_sid: &str,
        participant_sid: &str,
    ) -> ConversationResult<()> {
        let url = format!("{}/{}", self.participants_url(conversation_sid), participant_sid);
        self.delete(&url).await
    }

    async fn send_message(
        &self,
        conversation_sid: &str,
        author: &str,
        body: &str,
    ) -> ConversationResult<ConversationMessage> {
        self.post_form(
            &self.messages_url(conversation_sid),
            &[("Author", author), ("Body", body)],
        )
        .await
    }

    async fn list_messages(
        &self,
        conversation_sid: &str,
        limit: u32,
    ) -> ConversationResult<Vec<ConversationMessage>> {
        let limit = limit.to_string();
        let page: MessagePage = self
            .get_json(
                &self.messages_url(conversation_sid),
                &[("PageSize", limit.as_str()), ("Order", "desc")],
            )
            .await?;
        Ok(page.messages)
    }
}
