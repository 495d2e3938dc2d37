/// Message input bound to the open conversation
use crate::api::ChatApi;
use crate::client::{ChatClient, Outcome};
use crate::error::Result;
use crate::model::Message;
use crate::state::{ChatState, SkipReason};

#[derive(Debug, Clone, Default)]
pub struct ComposeBox {
    draft: String,
}

impl ComposeBox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn set_draft(&mut self, text: impl Into<String>) {
        self.draft = text.into();
    }

    pub fn push(&mut self, c: char) {
        self.draft.push(c);
    }

    pub fn backspace(&mut self) {
        self.draft.pop();
    }

    pub fn clear(&mut self) {
        self.draft.clear();
    }

    /// Whether the send control should be enabled
    pub fn can_submit(&self, state: &ChatState) -> bool {
        state.open.conversation_id.is_some() && state.check_send(&self.draft).is_ok()
    }

    /// Send the draft to the open conversation.
    ///
    /// The draft is cleared only once the backend confirms the message; on
    /// failure it stays for a retry.
    pub async fn submit<A: ChatApi + ?Sized>(
        &mut self,
        client: &ChatClient<A>,
    ) -> Result<Outcome<Message>> {
        let Some(conversation_id) = client.read(|s| s.open.conversation_id.clone()).await else {
            return Ok(Outcome::Skipped(SkipReason::NotOpen));
        };
        let outcome = client.send_message(&conversation_id, &self.draft).await?;
        if outcome.is_applied() {
            self.draft.clear();
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_can_submit_requires_open_conversation_and_text() {
        let mut state = ChatState::new("me");
        let mut compose = ComposeBox::new();
        compose.set_draft("hi");
        assert!(!compose.can_submit(&state));

        state.open.conversation_id = Some("c1".to_string());
        assert!(compose.can_submit(&state));

        compose.set_draft("   \n");
        assert!(!compose.can_submit(&state));

        compose.set_draft("hi");
        state.sending = true;
        assert!(!compose.can_submit(&state));
    }

    #[test]
    fn test_editing() {
        let mut compose = ComposeBox::new();
        for c in "hey".chars() {
            compose.push(c);
        }
        compose.backspace();
        assert_eq!(compose.draft(), "he");
        compose.clear();
        assert_eq!(compose.draft(), "");
    }
}
