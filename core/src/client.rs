/// Effect layer: performs the network calls and commits their results to
/// [`ChatState`] through the reducer. Cheap to clone; clones share state.
use crate::api::ChatApi;
use crate::cursor::Cursor;
use crate::error::{ChatError, Result};
use crate::model::{ChatEvent, ConversationSummary, DeliveryStatus, Message, NewConversation};
use crate::state::{Action, Applied, ChatState, SkipReason};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Result of an operation that did not fail
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Applied(T),
    /// Preconditions not met; no request was issued
    Skipped(SkipReason),
    /// A newer open/clear superseded the request; its result was dropped
    Stale,
}

impl<T> Outcome<T> {
    pub fn applied(self) -> Option<T> {
        match self {
            Outcome::Applied(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, Outcome::Applied(_))
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Outcome::Applied(v) => Outcome::Applied(f(v)),
            Outcome::Skipped(reason) => Outcome::Skipped(reason),
            Outcome::Stale => Outcome::Stale,
        }
    }
}

pub struct ChatClient<A: ChatApi + ?Sized> {
    api: Arc<A>,
    state: Arc<RwLock<ChatState>>,
    events: broadcast::Sender<ChatEvent>,
}

impl<A: ChatApi + ?Sized> Clone for ChatClient<A> {
    fn clone(&self) -> Self {
        Self {
            api: self.api.clone(),
            state: self.state.clone(),
            events: self.events.clone(),
        }
    }
}

impl<A: ChatApi + ?Sized> ChatClient<A> {
    pub fn new(api: Arc<A>, viewer_id: impl Into<String>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            api,
            state: Arc::new(RwLock::new(ChatState::new(viewer_id))),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.events.subscribe()
    }

    /// Immutable copy of the whole state
    pub async fn snapshot(&self) -> ChatState {
        self.state.read().await.clone()
    }

    pub async fn read<R>(&self, f: impl FnOnce(&ChatState) -> R) -> R {
        f(&*self.state.read().await)
    }

    async fn dispatch(&self, action: Action) -> Applied {
        self.state.write().await.apply(action)
    }

    fn emit(&self, event: ChatEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn notify_error(&self, context: &str, err: &ChatError) {
        warn!(context, error = %err, "operation failed");
        self.emit(ChatEvent::Error {
            context: context.to_string(),
            message: err.user_message(),
        });
    }

    /// `GET /conversations` into the summary list
    pub async fn load_conversations(&self) -> Result<Outcome<usize>> {
        self.dispatch(Action::ConversationsRequested).await;
        match self.api.list_conversations().await {
            Ok(list) => {
                let count = list.len();
                self.dispatch(Action::ConversationsLoaded(list)).await;
                info!(count, "conversations loaded");
                self.emit(ChatEvent::ConversationsLoaded { count });
                Ok(Outcome::Applied(count))
            }
            Err(e) => {
                self.dispatch(Action::ConversationsFailed(e.user_message())).await;
                self.notify_error("load conversations", &e);
                Err(e)
            }
        }
    }

    /// Make `conversation_id` the open conversation and load its newest page.
    ///
    /// Returns the number of messages loaded, or `Stale` when another open or
    /// clear happened before the response arrived.
    pub async fn open_conversation(&self, conversation_id: &str) -> Result<Outcome<usize>> {
        let generation = {
            let mut state = self.state.write().await;
            state.apply(Action::OpenRequested {
                conversation_id: conversation_id.to_string(),
            });
            state.generation()
        };

        let fetched = tokio::try_join!(
            self.api.get_conversation(conversation_id),
            self.api.fetch_messages(conversation_id, None)
        );

        match fetched {
            Ok((conversation, page)) => {
                let count = page.messages.len();
                let applied = self
                    .dispatch(Action::OpenLoaded {
                        generation,
                        conversation,
                        page,
                    })
                    .await;
                if applied == Applied::Stale {
                    return Ok(Outcome::Stale);
                }
                info!(%conversation_id, count, "conversation opened");
                self.emit(ChatEvent::ConversationOpened {
                    conversation_id: conversation_id.to_string(),
                    message_count: count,
                });
                Ok(Outcome::Applied(count))
            }
            Err(e) => {
                let applied = self
                    .dispatch(Action::OpenFailed {
                        generation,
                        error: e.user_message(),
                    })
                    .await;
                if applied == Applied::Stale {
                    return Ok(Outcome::Stale);
                }
                self.notify_error("open conversation", &e);
                Err(e)
            }
        }
    }

    /// Fetch the page before `cursor` and prepend it.
    ///
    /// Skipped without a request when the conversation is exhausted, not open,
    /// or already fetching.
    pub async fn load_older_page(
        &self,
        conversation_id: &str,
        cursor: Cursor,
    ) -> Result<Outcome<usize>> {
        let generation = {
            let mut state = self.state.write().await;
            if let Err(reason) = state.check_older_page(conversation_id) {
                debug!(%conversation_id, ?reason, "older page skipped");
                return Ok(Outcome::Skipped(reason));
            }
            let generation = state.generation();
            state.apply(Action::OlderRequested { generation });
            generation
        };

        debug!(%conversation_id, %cursor, "loading older page");
        match self.api.fetch_messages(conversation_id, Some(cursor)).await {
            Ok(page) => {
                let count = page.messages.len();
                if self.dispatch(Action::OlderLoaded { generation, page }).await == Applied::Stale {
                    return Ok(Outcome::Stale);
                }
                self.emit(ChatEvent::OlderMessagesPrepended {
                    conversation_id: conversation_id.to_string(),
                    count,
                });
                Ok(Outcome::Applied(count))
            }
            Err(e) => {
                let applied = self
                    .dispatch(Action::OlderFailed {
                        generation,
                        error: e.user_message(),
                    })
                    .await;
                if applied == Applied::Stale {
                    return Ok(Outcome::Stale);
                }
                self.notify_error("load older messages", &e);
                Err(e)
            }
        }
    }

    /// Load the page before the open conversation's current cursor
    pub async fn load_older(&self) -> Result<Outcome<usize>> {
        let target = self
            .read(|s| {
                s.open
                    .conversation_id
                    .clone()
                    .map(|id| (id, s.open.cursor.next_cursor))
            })
            .await;
        match target {
            None => Ok(Outcome::Skipped(SkipReason::NotOpen)),
            Some((id, Some(cursor))) => self.load_older_page(&id, cursor).await,
            Some((id, None)) => {
                let reason = self
                    .read(|s| s.check_older_page(&id).err().unwrap_or(SkipReason::NoCursor))
                    .await;
                Ok(Outcome::Skipped(reason))
            }
        }
    }

    /// Send `content` and append the confirmed message.
    ///
    /// Only one send may be in flight; a second call meanwhile is skipped.
    pub async fn send_message(
        &self,
        conversation_id: &str,
        content: &str,
    ) -> Result<Outcome<Message>> {
        {
            let mut state = self.state.write().await;
            if let Err(reason) = state.check_send(content) {
                debug!(%conversation_id, ?reason, "send skipped");
                return Ok(Outcome::Skipped(reason));
            }
            state.apply(Action::SendRequested);
        }

        match self.api.send_message(conversation_id, content.trim()).await {
            Ok(message) => {
                self.dispatch(Action::SendSucceeded {
                    conversation_id: conversation_id.to_string(),
                    message: message.clone(),
                })
                .await;
                info!(%conversation_id, message_id = %message.id, "message sent");
                self.emit(ChatEvent::MessageSent {
                    conversation_id: conversation_id.to_string(),
                    message: message.clone(),
                });
                Ok(Outcome::Applied(message))
            }
            Err(e) => {
                self.dispatch(Action::SendFailed {
                    error: e.user_message(),
                })
                .await;
                self.notify_error("send message", &e);
                Err(e)
            }
        }
    }

    /// Create a conversation, put it at the top of the list and open it empty
    pub async fn start_conversation(
        &self,
        request: NewConversation,
    ) -> Result<Outcome<ConversationSummary>> {
        if request.participant_ids.is_empty() {
            return Err(ChatError::Validation(
                "a conversation needs at least one other participant".to_string(),
            ));
        }

        match self.api.create_conversation(&request).await {
            Ok(conversation) => {
                let id = conversation.id.clone();
                let summary = {
                    let mut state = self.state.write().await;
                    state.apply(Action::ConversationCreated { conversation });
                    state.conversations.find(&id).cloned()
                };
                info!(conversation_id = %id, kind = ?request.kind, "conversation created");
                self.emit(ChatEvent::ConversationCreated {
                    conversation_id: id.clone(),
                });
                summary
                    .map(Outcome::Applied)
                    .ok_or_else(|| ChatError::Validation(format!("created conversation {} missing", id)))
            }
            Err(e) => {
                self.notify_error("start conversation", &e);
                Err(e)
            }
        }
    }

    /// `POST .../read` for `message_ids`, then mark them read locally
    pub async fn mark_read(
        &self,
        conversation_id: &str,
        message_ids: Vec<String>,
    ) -> Result<Outcome<usize>> {
        if message_ids.is_empty() {
            return Ok(Outcome::Applied(0));
        }
        if let Err(e) = self.api.mark_read(conversation_id, &message_ids).await {
            self.notify_error("mark read", &e);
            return Err(e);
        }
        let count = message_ids.len();
        self.dispatch(Action::MessagesRead {
            conversation_id: conversation_id.to_string(),
            message_ids: message_ids.clone(),
        })
        .await;
        self.emit(ChatEvent::MessagesRead {
            conversation_id: conversation_id.to_string(),
            message_ids,
        });
        Ok(Outcome::Applied(count))
    }

    /// Mark every foreign, unread message in the open window as read
    pub async fn mark_open_conversation_read(&self) -> Result<Outcome<usize>> {
        let target = self
            .read(|s| {
                let id = s.open.conversation_id.clone()?;
                let unread: Vec<String> = s
                    .open
                    .messages
                    .iter()
                    .filter(|m| m.sender.id != s.viewer_id() && m.status != DeliveryStatus::Read)
                    .map(|m| m.id.clone())
                    .collect();
                Some((id, unread))
            })
            .await;
        match target {
            Some((id, unread)) => self.mark_read(&id, unread).await,
            None => Ok(Outcome::Skipped(SkipReason::NotOpen)),
        }
    }

    pub async fn clear_open_conversation(&self) {
        self.dispatch(Action::ClearOpenConversation).await;
    }

    pub async fn clear_messages(&self) {
        self.dispatch(Action::ClearMessages).await;
    }
}
