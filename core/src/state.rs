/// Conversation view-state container.
///
/// Holds the conversation summary list, the single open conversation (metadata,
/// loaded message window, pagination cursor) and the global send-in-flight flag.
/// All transitions go through [`ChatState::apply`]; network effects live in
/// [`crate::client::ChatClient`].
use crate::cursor::Cursor;
use crate::model::{Conversation, ConversationSummary, LastMessage, Message, MessagePage};
use std::collections::HashSet;
use tracing::{debug, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadStatus {
    #[default]
    Idle,
    Loading,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Default)]
pub struct ConversationListState {
    pub items: Vec<ConversationSummary>,
    pub status: LoadStatus,
    pub error: Option<String>,
}

impl ConversationListState {
    pub fn find(&self, conversation_id: &str) -> Option<&ConversationSummary> {
        self.items.iter().find(|c| c.id == conversation_id)
    }
}

/// Pagination cursor state of the open conversation.
///
/// `has_more` is false iff `fetched_count >= total_count`, and stays false
/// until the open conversation is reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CursorState {
    pub total_count: u64,
    pub fetched_count: u64,
    pub remaining_count: u64,
    pub has_more: bool,
    pub next_cursor: Option<Cursor>,
}

#[derive(Debug, Clone, Default)]
pub struct OpenConversationState {
    pub conversation_id: Option<String>,
    pub conversation: Option<Conversation>,
    /// Oldest first
    pub messages: Vec<Message>,
    pub cursor: CursorState,
    pub status: LoadStatus,
    pub loading_older: bool,
    pub error: Option<String>,
    /// Older-page requests settled since the conversation was opened, merged
    /// (empty pages included) or failed
    pub older_completions: u64,
}

impl OpenConversationState {
    pub fn is_open(&self, conversation_id: &str) -> bool {
        self.conversation_id.as_deref() == Some(conversation_id)
    }

    /// True while the first page or an older page is being fetched
    pub fn is_pending(&self) -> bool {
        self.status == LoadStatus::Loading || self.loading_older
    }
}

/// Why an operation was not started
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The conversation is not the open one
    NotOpen,
    /// `has_more` is false
    Exhausted,
    /// A fetch for the conversation is already pending
    FetchInFlight,
    /// A send is already in flight
    SendInFlight,
    /// Message content is blank
    EmptyContent,
    /// More pages exist but no cursor is known
    NoCursor,
}

/// Whether a dispatched action changed state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Committed,
    /// Completion of a request issued under an older generation; dropped
    Stale,
}

#[derive(Debug, Clone)]
pub enum Action {
    ConversationsRequested,
    ConversationsLoaded(Vec<Conversation>),
    ConversationsFailed(String),
    OpenRequested { conversation_id: String },
    OpenLoaded { generation: u64, conversation: Conversation, page: MessagePage },
    OpenFailed { generation: u64, error: String },
    OlderRequested { generation: u64 },
    OlderLoaded { generation: u64, page: MessagePage },
    OlderFailed { generation: u64, error: String },
    SendRequested,
    SendSucceeded { conversation_id: String, message: Message },
    SendFailed { error: String },
    ConversationCreated { conversation: Conversation },
    MessagesRead { conversation_id: String, message_ids: Vec<String> },
    ClearOpenConversation,
    ClearMessages,
}

#[derive(Debug, Clone)]
pub struct ChatState {
    viewer_id: String,
    pub conversations: ConversationListState,
    pub open: OpenConversationState,
    pub sending: bool,
    pub send_error: Option<String>,
    /// Bumped on every open/clear; completions carrying an older value are stale
    generation: u64,
    /// Bumped on every confirmed send
    sends_completed: u64,
}

impl ChatState {
    pub fn new(viewer_id: impl Into<String>) -> Self {
        Self {
            viewer_id: viewer_id.into(),
            conversations: ConversationListState::default(),
            open: OpenConversationState::default(),
            sending: false,
            send_error: None,
            generation: 0,
            sends_completed: 0,
        }
    }

    pub fn viewer_id(&self) -> &str {
        &self.viewer_id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn sends_completed(&self) -> u64 {
        self.sends_completed
    }

    /// Checks the preconditions for loading the page before `cursor`
    pub fn check_older_page(&self, conversation_id: &str) -> Result<(), SkipReason> {
        if !self.open.is_open(conversation_id) {
            return Err(SkipReason::NotOpen);
        }
        if self.open.is_pending() {
            return Err(SkipReason::FetchInFlight);
        }
        if !self.open.cursor.has_more {
            return Err(SkipReason::Exhausted);
        }
        Ok(())
    }

    /// Checks the preconditions for sending `content`
    pub fn check_send(&self, content: &str) -> Result<(), SkipReason> {
        if self.sending {
            return Err(SkipReason::SendInFlight);
        }
        if content.trim().is_empty() {
            return Err(SkipReason::EmptyContent);
        }
        Ok(())
    }

    /// Reducer: apply one transition
    pub fn apply(&mut self, action: Action) -> Applied {
        match action {
            Action::ConversationsRequested => {
                self.conversations.status = LoadStatus::Loading;
                self.conversations.error = None;
            }
            Action::ConversationsLoaded(list) => {
                self.conversations.items = list
                    .iter()
                    .map(|c| ConversationSummary::from_conversation(c, &self.viewer_id))
                    .collect();
                self.conversations.status = LoadStatus::Succeeded;
                debug!(count = self.conversations.items.len(), "conversation list replaced");
            }
            Action::ConversationsFailed(error) => {
                self.conversations.status = LoadStatus::Failed;
                self.conversations.error = Some(error);
            }
            Action::OpenRequested { conversation_id } => {
                self.generation += 1;
                debug!(%conversation_id, generation = self.generation, "opening conversation");
                self.open = OpenConversationState {
                    conversation_id: Some(conversation_id),
                    status: LoadStatus::Loading,
                    ..Default::default()
                };
            }
            Action::OpenLoaded { generation, conversation, page } => {
                if self.is_stale(generation, "open") {
                    return Applied::Stale;
                }
                let mut messages = page.messages;
                messages.reverse();
                self.open.cursor = next_cursor_state(None, &page.pagination, page.cursor, &messages);
                self.open.messages = messages;
                self.open.conversation = Some(conversation);
                self.open.status = LoadStatus::Succeeded;
                self.open.error = None;
                debug!(
                    count = self.open.messages.len(),
                    has_more = self.open.cursor.has_more,
                    "first page loaded"
                );
            }
            Action::OpenFailed { generation, error } => {
                if self.is_stale(generation, "open failure") {
                    return Applied::Stale;
                }
                self.open.status = LoadStatus::Failed;
                self.open.error = Some(error);
            }
            Action::OlderRequested { generation } => {
                if self.is_stale(generation, "older request") {
                    return Applied::Stale;
                }
                self.open.loading_older = true;
            }
            Action::OlderLoaded { generation, page } => {
                if self.is_stale(generation, "older page") {
                    return Applied::Stale;
                }
                self.open.loading_older = false;
                let mut older = page.messages;
                older.reverse();
                let previous = self.open.cursor;
                self.open.cursor =
                    next_cursor_state(Some(&previous), &page.pagination, page.cursor, &older);
                // No dedup by id: a repeated page is prepended again
                let count = older.len();
                older.append(&mut self.open.messages);
                self.open.messages = older;
                self.open.status = LoadStatus::Succeeded;
                self.open.error = None;
                self.open.older_completions += 1;
                debug!(
                    prepended = count,
                    total = self.open.messages.len(),
                    has_more = self.open.cursor.has_more,
                    "older page merged"
                );
            }
            Action::OlderFailed { generation, error } => {
                if self.is_stale(generation, "older failure") {
                    return Applied::Stale;
                }
                self.open.loading_older = false;
                self.open.older_completions += 1;
                self.open.status = LoadStatus::Failed;
                self.open.error = Some(error);
            }
            Action::SendRequested => {
                self.sending = true;
                self.send_error = None;
            }
            Action::SendSucceeded { conversation_id, message } => {
                self.sending = false;
                self.sends_completed += 1;
                self.record_sent_message(&conversation_id, message);
            }
            Action::SendFailed { error } => {
                self.sending = false;
                self.send_error = Some(error);
            }
            Action::ConversationCreated { conversation } => {
                self.generation += 1;
                let summary = ConversationSummary::from_conversation(&conversation, &self.viewer_id);
                self.conversations.items.retain(|c| c.id != summary.id);
                self.conversations.items.insert(0, summary);
                debug!(conversation_id = %conversation.id, "conversation created and opened");
                self.open = OpenConversationState {
                    conversation_id: Some(conversation.id.clone()),
                    conversation: Some(conversation),
                    status: LoadStatus::Succeeded,
                    ..Default::default()
                };
            }
            Action::MessagesRead { conversation_id, message_ids } => {
                if self.open.is_open(&conversation_id) {
                    let ids: HashSet<&str> = message_ids.iter().map(String::as_str).collect();
                    for msg in &mut self.open.messages {
                        if ids.contains(msg.id.as_str()) {
                            msg.status = crate::model::DeliveryStatus::Read;
                        }
                    }
                }
            }
            Action::ClearOpenConversation => {
                self.generation += 1;
                self.open = OpenConversationState::default();
            }
            Action::ClearMessages => {
                self.generation += 1;
                self.open.messages.clear();
                self.open.cursor = CursorState::default();
                self.open.status = LoadStatus::Idle;
                self.open.loading_older = false;
                self.open.error = None;
            }
        }
        Applied::Committed
    }

    fn is_stale(&self, generation: u64, what: &str) -> bool {
        if generation != self.generation {
            warn!(
                what,
                issued = generation,
                current = self.generation,
                "discarding result from superseded request"
            );
            return true;
        }
        false
    }

    fn record_sent_message(&mut self, conversation_id: &str, message: Message) {
        let last = LastMessage::from(&message);

        // Move the owning summary to the front with its preview refreshed
        let summary = match self.conversations.items.iter().position(|c| c.id == conversation_id) {
            Some(idx) => Some(self.conversations.items.remove(idx)),
            None => self
                .open
                .conversation
                .as_ref()
                .filter(|c| c.id == conversation_id)
                .map(|c| ConversationSummary::from_conversation(c, &self.viewer_id)),
        };
        if let Some(mut summary) = summary {
            summary.last_message = Some(last.clone());
            summary.updated_at = message.created_at;
            self.conversations.items.insert(0, summary);
        }

        if self.open.is_open(conversation_id) {
            if let Some(conversation) = self.open.conversation.as_mut() {
                conversation.last_message = Some(last);
                conversation.updated_at = message.created_at;
            }
            self.open.cursor.total_count += 1;
            self.open.cursor.fetched_count += 1;
            trace!(message_id = %message.id, "appending sent message");
            self.open.messages.push(message);
        } else {
            debug!(%conversation_id, "sent message belongs to a conversation that is no longer open");
        }
    }
}

/// Cursor state after merging a page.
///
/// Counts come from the backend; `has_more` is recomputed from them. An empty
/// older page exhausts the conversation even if the counts disagree.
fn next_cursor_state(
    previous: Option<&CursorState>,
    info: &crate::model::PaginationInfo,
    cursor: Option<Cursor>,
    page_oldest_first: &[Message],
) -> CursorState {
    let mut state = CursorState {
        total_count: info.total_count,
        fetched_count: info.fetched_count,
        remaining_count: info.remaining_count,
        has_more: info.fetched_count < info.total_count,
        next_cursor: cursor
            .or_else(|| page_oldest_first.first().map(|m| Cursor::from(m.created_at))),
    };

    if state.has_more != info.has_more {
        warn!(
            total = info.total_count,
            fetched = info.fetched_count,
            server_has_more = info.has_more,
            "pagination flag disagrees with counts; using counts"
        );
    }

    let exhausted_before = previous.map(|p| !p.has_more).unwrap_or(false);
    let empty_older_page = previous.is_some() && page_oldest_first.is_empty();
    if exhausted_before || empty_older_page {
        state.has_more = false;
        state.fetched_count = state.fetched_count.max(state.total_count);
        state.remaining_count = 0;
    }
    state
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ConversationKind, DeliveryStatus, PaginationInfo, Participant};
    use chrono::{TimeZone, Utc};

    fn person(id: &str) -> Participant {
        Participant {
            id: id.to_string(),
            first_name: id.to_uppercase(),
            last_name: String::new(),
            avatar: None,
            headline: None,
        }
    }

    fn conversation(id: &str) -> Conversation {
        Conversation {
            id: id.to_string(),
            kind: ConversationKind::Direct,
            participants: vec![person("me"), person("u2")],
            title: None,
            description: None,
            last_message: None,
            updated_at: Utc.timestamp_opt(1_000, 0).unwrap(),
        }
    }

    fn message(n: i64) -> Message {
        Message {
            id: format!("m{}", n),
            conversation_id: Some("c1".to_string()),
            sender: person(if n % 2 == 0 { "me" } else { "u2" }),
            content: format!("message {}", n),
            created_at: Utc.timestamp_opt(1_700_000_000 + n, 0).unwrap(),
            status: DeliveryStatus::Sent,
        }
    }

    /// Newest-first page covering `from..=to`
    fn page(from: i64, to: i64, total: u64, fetched: u64) -> MessagePage {
        MessagePage {
            messages: (from..=to).rev().map(message).collect(),
            pagination: PaginationInfo {
                total_count: total,
                fetched_count: fetched,
                remaining_count: total.saturating_sub(fetched),
                has_more: fetched < total,
            },
            cursor: Some(Cursor::from(Utc.timestamp_opt(1_700_000_000 + from, 0).unwrap())),
        }
    }

    fn opened(first_page: MessagePage) -> ChatState {
        let mut state = ChatState::new("me");
        state.apply(Action::OpenRequested { conversation_id: "c1".to_string() });
        let generation = state.generation();
        state.apply(Action::OpenLoaded {
            generation,
            conversation: conversation("c1"),
            page: first_page,
        });
        state
    }

    fn ids(state: &ChatState) -> Vec<String> {
        state.open.messages.iter().map(|m| m.id.clone()).collect()
    }

    #[test]
    fn test_first_page_is_reversed_to_oldest_first() {
        let state = opened(page(11, 20, 30, 10));
        assert_eq!(state.open.messages.len(), 10);
        assert_eq!(state.open.messages.first().unwrap().id, "m11");
        assert_eq!(state.open.messages.last().unwrap().id, "m20");
        assert!(state.open.cursor.has_more);
        assert_eq!(state.open.status, LoadStatus::Succeeded);
    }

    #[test]
    fn test_older_pages_keep_oldest_first_order() {
        let mut state = opened(page(21, 30, 30, 10));
        for (from, to, fetched) in [(11, 20, 20), (1, 10, 30)] {
            let generation = state.generation();
            state.apply(Action::OlderRequested { generation });
            state.apply(Action::OlderLoaded { generation, page: page(from, to, 30, fetched) });
        }

        assert_eq!(state.open.messages.len(), 30);
        assert!(state
            .open
            .messages
            .windows(2)
            .all(|w| w[0].created_at < w[1].created_at));
        assert!(!state.open.cursor.has_more);
        assert_eq!(state.check_older_page("c1"), Err(SkipReason::Exhausted));
    }

    #[test]
    fn test_duplicate_older_page_is_prepended_twice() {
        let mut state = opened(page(21, 30, 40, 10));
        for _ in 0..2 {
            let generation = state.generation();
            state.apply(Action::OlderRequested { generation });
            state.apply(Action::OlderLoaded { generation, page: page(11, 20, 40, 20) });
        }

        assert_eq!(state.open.messages.len(), 30);
        let m11 = ids(&state).iter().filter(|id| id.as_str() == "m11").count();
        assert_eq!(m11, 2);
    }

    #[test]
    fn test_exhaustion_latches_until_reset() {
        let mut state = opened(page(11, 20, 10, 10));
        assert!(!state.open.cursor.has_more);

        // Counts that claim more cannot revive pagination
        let generation = state.generation();
        state.apply(Action::OlderLoaded { generation, page: page(1, 10, 40, 20) });
        assert!(!state.open.cursor.has_more);
        assert!(state.open.cursor.fetched_count >= state.open.cursor.total_count);

        // Reopening resets it
        state.apply(Action::OpenRequested { conversation_id: "c1".to_string() });
        let generation = state.generation();
        state.apply(Action::OpenLoaded {
            generation,
            conversation: conversation("c1"),
            page: page(31, 40, 40, 10),
        });
        assert!(state.open.cursor.has_more);
    }

    #[test]
    fn test_empty_older_page_exhausts() {
        let mut state = opened(page(11, 20, 30, 10));
        let generation = state.generation();
        state.apply(Action::OlderRequested { generation });
        let mut empty = page(1, 0, 30, 10);
        empty.cursor = None;
        state.apply(Action::OlderLoaded { generation, page: empty });

        assert_eq!(state.open.messages.len(), 10);
        assert!(!state.open.cursor.has_more);
        assert_eq!(state.open.cursor.remaining_count, 0);
        assert_eq!(state.open.older_completions, 1);
    }

    #[test]
    fn test_missing_cursor_falls_back_to_oldest_message() {
        let mut first = page(11, 20, 30, 10);
        first.cursor = None;
        let state = opened(first);
        assert_eq!(
            state.open.cursor.next_cursor,
            Some(Cursor::from(state.open.messages[0].created_at))
        );
    }

    #[test]
    fn test_stale_open_result_is_discarded() {
        let mut state = ChatState::new("me");
        state.apply(Action::OpenRequested { conversation_id: "c1".to_string() });
        let first = state.generation();
        state.apply(Action::OpenRequested { conversation_id: "c2".to_string() });
        let second = state.generation();

        let applied = state.apply(Action::OpenLoaded {
            generation: first,
            conversation: conversation("c1"),
            page: page(1, 10, 10, 10),
        });
        assert_eq!(applied, Applied::Stale);
        assert!(state.open.is_open("c2"));
        assert!(state.open.messages.is_empty());
        assert_eq!(state.open.status, LoadStatus::Loading);

        let applied = state.apply(Action::OpenLoaded {
            generation: second,
            conversation: conversation("c2"),
            page: page(1, 3, 3, 3),
        });
        assert_eq!(applied, Applied::Committed);
        assert_eq!(state.open.messages.len(), 3);
    }

    #[test]
    fn test_older_failure_keeps_data_and_has_more() {
        let mut state = opened(page(11, 20, 30, 10));
        let generation = state.generation();
        state.apply(Action::OlderRequested { generation });
        assert_eq!(state.check_older_page("c1"), Err(SkipReason::FetchInFlight));

        state.apply(Action::OlderFailed { generation, error: "boom".to_string() });
        assert_eq!(state.open.messages.len(), 10);
        assert!(state.open.cursor.has_more);
        assert!(!state.open.loading_older);
        assert_eq!(state.open.status, LoadStatus::Failed);
        assert_eq!(state.open.error.as_deref(), Some("boom"));
        assert_eq!(state.open.older_completions, 1);
        assert_eq!(state.check_older_page("c1"), Ok(()));
    }

    #[test]
    fn test_send_success_appends_and_moves_summary() {
        let mut state = opened(page(11, 20, 30, 10));
        state.apply(Action::ConversationsLoaded(vec![conversation("c0"), conversation("c1")]));

        state.apply(Action::SendRequested);
        assert_eq!(state.check_send("again"), Err(SkipReason::SendInFlight));

        let mut sent = message(22);
        sent.content = "hello".to_string();
        state.apply(Action::SendSucceeded { conversation_id: "c1".to_string(), message: sent });

        assert!(!state.sending);
        assert_eq!(state.sends_completed(), 1);
        assert_eq!(state.open.messages.len(), 11);
        assert_eq!(state.open.messages.last().unwrap().content, "hello");
        assert_eq!(state.open.cursor.total_count, 31);
        assert_eq!(state.open.cursor.fetched_count, 11);
        assert_eq!(state.conversations.items[0].id, "c1");
        assert_eq!(
            state.conversations.items[0].last_message.as_ref().unwrap().content,
            "hello"
        );
        assert_eq!(state.conversations.items.len(), 2);
    }

    #[test]
    fn test_send_failure_changes_no_list() {
        let mut state = opened(page(11, 20, 30, 10));
        state.apply(Action::SendRequested);
        state.apply(Action::SendFailed { error: "offline".to_string() });
        assert!(!state.sending);
        assert_eq!(state.sends_completed(), 0);
        assert_eq!(state.send_error.as_deref(), Some("offline"));
        assert_eq!(state.open.messages.len(), 10);
    }

    #[test]
    fn test_blank_content_rejected() {
        let state = ChatState::new("me");
        assert_eq!(state.check_send("   \n"), Err(SkipReason::EmptyContent));
        assert_eq!(state.check_send(" hi "), Ok(()));
    }

    #[test]
    fn test_conversation_created_unshifts_and_opens() {
        let mut state = ChatState::new("me");
        state.apply(Action::ConversationsLoaded(vec![conversation("c0")]));
        state.apply(Action::ConversationCreated { conversation: conversation("c9") });

        assert_eq!(state.conversations.items[0].id, "c9");
        assert_eq!(state.conversations.items[0].title, "Chat");
        assert!(state.open.is_open("c9"));
        assert!(state.open.messages.is_empty());
        assert_eq!(state.open.status, LoadStatus::Succeeded);
    }

    #[test]
    fn test_clear_messages_discards_in_flight_older_page() {
        let mut state = opened(page(11, 20, 30, 10));
        let generation = state.generation();
        state.apply(Action::OlderRequested { generation });
        state.apply(Action::ClearMessages);

        let applied = state.apply(Action::OlderLoaded { generation, page: page(1, 10, 30, 20) });
        assert_eq!(applied, Applied::Stale);
        assert!(state.open.messages.is_empty());
        assert!(state.open.is_open("c1"));
        assert_eq!(state.open.cursor, CursorState::default());
    }

    #[test]
    fn test_clear_open_conversation() {
        let mut state = opened(page(11, 20, 30, 10));
        state.apply(Action::ClearOpenConversation);
        assert!(state.open.conversation_id.is_none());
        assert!(state.open.messages.is_empty());
        assert_eq!(state.open.status, LoadStatus::Idle);
    }

    #[test]
    fn test_messages_read_updates_status() {
        let mut state = opened(page(11, 14, 4, 4));
        state.apply(Action::MessagesRead {
            conversation_id: "c1".to_string(),
            message_ids: vec!["m11".to_string(), "m13".to_string()],
        });
        let read: Vec<_> = state
            .open
            .messages
            .iter()
            .filter(|m| m.status == DeliveryStatus::Read)
            .map(|m| m.id.as_str())
            .collect();
        assert_eq!(read, vec!["m11", "m13"]);
    }
}
