//! Group SMS delivery of crypto market digests.
//!
//! This crate provides:
//! - Conversation API abstraction with a Twilio Conversations client
//! - Conversation lookup/creation and participant roster reconciliation
//! - Alert dispatch: concurrent fetch, ordered join, single message send

pub mod config;
pub mod conversation;
pub mod dispatcher;
pub mod error;
pub mod twilio;

pub use config::AlertSettings;
pub use conversation::{
    Conversation, ConversationApi, ConversationManager, ConversationMessage,
    ConversationParticipant, MessagingBinding, MockConversationApi, RosterReport,
};
pub use dispatcher::{AlertDispatcher, AlertMessage, DispatchReport, FetchPolicy};
pub use error::{ConversationError, ConversationResult, DispatchError};
pub use twilio::TwilioClient;
