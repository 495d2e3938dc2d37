/// Start-or-reuse flow for direct conversations
use crate::api::ChatApi;
use crate::client::{ChatClient, Outcome};
use crate::error::{ChatError, Result};
use crate::model::{ConversationKind, ConversationSummary, NewConversation};
use tracing::info;

/// Existing direct conversation that includes `recipient_id`, if loaded
pub fn find_direct_conversation<'a>(
    conversations: &'a [ConversationSummary],
    recipient_id: &str,
) -> Option<&'a ConversationSummary> {
    conversations
        .iter()
        .find(|c| c.kind == ConversationKind::Direct && c.includes(recipient_id))
}

#[derive(Debug, Clone, PartialEq)]
pub enum StartedConversation {
    /// An existing direct conversation was opened
    Reused(String),
    Created(ConversationSummary),
}

impl StartedConversation {
    pub fn conversation_id(&self) -> &str {
        match self {
            StartedConversation::Reused(id) => id,
            StartedConversation::Created(summary) => &summary.id,
        }
    }
}

/// Recipient picker state. Pinned to a single recipient; selecting another
/// user replaces the current selection.
#[derive(Debug, Clone, Default)]
pub struct NewConversationFlow {
    recipient: Option<String>,
}

impl NewConversationFlow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select(&mut self, user_id: impl Into<String>) {
        self.recipient = Some(user_id.into());
    }

    pub fn deselect(&mut self) {
        self.recipient = None;
    }

    pub fn recipient(&self) -> Option<&str> {
        self.recipient.as_deref()
    }

    pub fn can_confirm(&self) -> bool {
        self.recipient.is_some()
    }

    /// Open the existing direct conversation with the recipient, or create one
    pub async fn confirm<A: ChatApi + ?Sized>(
        &mut self,
        client: &ChatClient<A>,
    ) -> Result<Outcome<StartedConversation>> {
        let recipient = self
            .recipient
            .clone()
            .ok_or_else(|| ChatError::Validation("select a recipient first".to_string()))?;

        let (viewer_id, existing) = client
            .read(|s| {
                (
                    s.viewer_id().to_string(),
                    find_direct_conversation(&s.conversations.items, &recipient)
                        .map(|c| c.id.clone()),
                )
            })
            .await;
        if recipient == viewer_id {
            return Err(ChatError::Validation(
                "cannot start a conversation with yourself".to_string(),
            ));
        }

        let outcome = match existing {
            Some(id) => {
                info!(conversation_id = %id, %recipient, "reusing direct conversation");
                client
                    .open_conversation(&id)
                    .await?
                    .map(|_| StartedConversation::Reused(id))
            }
            None => client
                .start_conversation(NewConversation::direct(recipient))
                .await?
                .map(StartedConversation::Created),
        };
        if outcome.is_applied() {
            self.recipient = None;
        }
        Ok(outcome)
    }
}
