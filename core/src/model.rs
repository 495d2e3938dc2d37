/// Shared types for the messaging layer (wire shapes + list summaries)
use crate::cursor::Cursor;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Title used when a conversation has none of its own
pub const DEFAULT_CONVERSATION_TITLE: &str = "Chat";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationKind {
    Direct,
    Group,
}

/// A conversation member as the backend describes it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub id: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headline: Option<String>,
}

impl Participant {
    pub fn display_name(&self) -> String {
        let full = format!("{} {}", self.first_name.trim(), self.last_name.trim());
        let full = full.trim();
        if full.is_empty() {
            self.id.clone()
        } else {
            full.to_string()
        }
    }

    /// Fixed shape used in list summaries: trimmed names, blank optionals dropped
    fn normalized(&self) -> Self {
        let non_blank = |v: &Option<String>| {
            v.as_ref()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        };
        Self {
            id: self.id.clone(),
            first_name: self.first_name.trim().to_string(),
            last_name: self.last_name.trim().to_string(),
            avatar: non_blank(&self.avatar),
            headline: non_blank(&self.headline),
        }
    }
}

/// Preview of the newest message in a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastMessage {
    pub content: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<String>,
}

impl From<&Message> for LastMessage {
    fn from(msg: &Message) -> Self {
        Self {
            content: msg.content.clone(),
            created_at: msg.created_at,
            sender_id: Some(msg.sender.id.clone()),
        }
    }
}

/// Full conversation record (`GET /conversations/:id`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ConversationKind,
    #[serde(default)]
    pub participants: Vec<Participant>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message: Option<LastMessage>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// The participant who is not the viewer (direct conversations)
    pub fn other_participant(&self, viewer_id: &str) -> Option<&Participant> {
        other_participant(&self.participants, viewer_id)
    }
}

fn other_participant<'a>(participants: &'a [Participant], viewer_id: &str) -> Option<&'a Participant> {
    participants.iter().find(|p| p.id != viewer_id)
}

/// Lightweight list entry shown in the conversation list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ConversationKind,
    pub participants: Vec<Participant>,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message: Option<LastMessage>,
    pub updated_at: DateTime<Utc>,
}

impl ConversationSummary {
    /// Build the list entry for a conversation as seen by `viewer_id`.
    ///
    /// Title defaults to [`DEFAULT_CONVERSATION_TITLE`]. Subtitle is the member
    /// count for groups and the other participant's headline for direct chats.
    pub fn from_conversation(conversation: &Conversation, viewer_id: &str) -> Self {
        let participants: Vec<Participant> = conversation
            .participants
            .iter()
            .map(Participant::normalized)
            .collect();

        let title = conversation
            .title
            .as_ref()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .unwrap_or(DEFAULT_CONVERSATION_TITLE)
            .to_string();

        let subtitle = match conversation.kind {
            ConversationKind::Group => Some(format!("{} members", participants.len())),
            ConversationKind::Direct => {
                other_participant(&participants, viewer_id).and_then(|p| p.headline.clone())
            }
        };

        Self {
            id: conversation.id.clone(),
            kind: conversation.kind,
            participants,
            title,
            subtitle,
            last_message: conversation.last_message.clone(),
            updated_at: conversation.updated_at,
        }
    }

    pub fn other_participant(&self, viewer_id: &str) -> Option<&Participant> {
        other_participant(&self.participants, viewer_id)
    }

    pub fn includes(&self, user_id: &str) -> bool {
        self.participants.iter().any(|p| p.id == user_id)
    }

    /// Name to show in a list: the other person for direct chats, else the title
    pub fn label(&self, viewer_id: &str) -> String {
        match self.kind {
            ConversationKind::Direct => self
                .other_participant(viewer_id)
                .map(Participant::display_name)
                .unwrap_or_else(|| self.title.clone()),
            ConversationKind::Group => self.title.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    #[default]
    Sent,
    Delivered,
    Read,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    pub sender: Participant,
    pub content: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub status: DeliveryStatus,
}

/// Pagination block returned with every message page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationInfo {
    pub total_count: u64,
    pub fetched_count: u64,
    pub remaining_count: u64,
    pub has_more: bool,
}

/// One page of messages, newest first as delivered by the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePage {
    pub messages: Vec<Message>,
    #[serde(default)]
    pub pagination: PaginationInfo,
    #[serde(default)]
    pub cursor: Option<Cursor>,
}

/// Body of `POST /conversations/new`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewConversation {
    pub participant_ids: Vec<String>,
    #[serde(rename = "type")]
    pub kind: ConversationKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl NewConversation {
    pub fn direct(recipient_id: impl Into<String>) -> Self {
        Self {
            participant_ids: vec![recipient_id.into()],
            kind: ConversationKind::Direct,
            title: None,
            description: None,
        }
    }
}

/// State-change notifications for front ends
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    ConversationsLoaded { count: usize },
    ConversationOpened { conversation_id: String, message_count: usize },
    OlderMessagesPrepended { conversation_id: String, count: usize },
    MessageSent { conversation_id: String, message: Message },
    ConversationCreated { conversation_id: String },
    MessagesRead { conversation_id: String, message_ids: Vec<String> },
    /// Transient user notification for a failed operation
    Error { context: String, message: String },
}
