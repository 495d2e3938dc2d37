/// REST client for the campus messaging backend
///
/// Endpoints:
///   GET  /conversations
///   GET  /conversations/:id
///   POST /conversations/new                 body: {"participantIds":[..],"type":"direct"|"group"}
///   GET  /messages/conversation/:id         ?cursor=<ISO-8601>
///   POST /messages/conversation/:id         body: {"content":"..."}
///   POST /messages/conversation/:id/read    body: {"messageIds":[..]}
use crate::config::Config;
use crate::cursor::Cursor;
use crate::error::{ChatError, Result};
use crate::model::{Conversation, Message, MessagePage, NewConversation};
use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use hyper::{Method, Request, StatusCode};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};
use uuid::Uuid;

/// Backend operations the state layer depends on
#[async_trait]
pub trait ChatApi: Send + Sync {
    async fn list_conversations(&self) -> Result<Vec<Conversation>>;

    async fn get_conversation(&self, conversation_id: &str) -> Result<Conversation>;

    async fn create_conversation(&self, request: &NewConversation) -> Result<Conversation>;

    /// Page of messages, newest first; `None` cursor means the most recent page
    async fn fetch_messages(&self, conversation_id: &str, cursor: Option<Cursor>)
        -> Result<MessagePage>;

    async fn send_message(&self, conversation_id: &str, content: &str) -> Result<Message>;

    async fn mark_read(&self, conversation_id: &str, message_ids: &[String]) -> Result<()>;
}

// ─── Wire envelopes ──────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(untagged)]
enum ConversationsBody {
    Wrapped { conversations: Vec<Conversation> },
    Bare(Vec<Conversation>),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ConversationBody {
    Wrapped { conversation: Conversation },
    Bare(Conversation),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum MessageBody {
    Wrapped { message: Message },
    Bare(Message),
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
    error: Option<String>,
}

#[derive(Serialize)]
struct SendRequest<'a> {
    content: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MarkReadRequest<'a> {
    message_ids: &'a [String],
}

// ─── HTTP implementation ─────────────────────────────────────────────────────

/// `ChatApi` over plain HTTP/1.1 using the hyper client
#[derive(Clone)]
pub struct HttpChatApi {
    client: Client<HttpConnector, Full<Bytes>>,
    base_url: String,
    token: Option<String>,
    request_timeout: Duration,
}

impl HttpChatApi {
    pub fn new(config: &Config) -> Self {
        let client = Client::builder(TokioExecutor::new()).build_http();
        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            request_timeout: config.request_timeout,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        url: String,
        body: Option<Vec<u8>>,
    ) -> Result<T> {
        let bytes = self.request_raw(method, url, body).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn request_raw(&self, method: Method, url: String, body: Option<Vec<u8>>) -> Result<Bytes> {
        let request_id = Uuid::new_v4();
        debug!(%request_id, %method, %url, "api request");

        let mut builder = Request::builder()
            .method(method.clone())
            .uri(&url)
            .header(ACCEPT, "application/json")
            .header("X-Request-Id", request_id.to_string());
        if let Some(token) = &self.token {
            builder = builder.header(AUTHORIZATION, format!("Bearer {}", token));
        }
        let req = match body {
            Some(b) => builder
                .header(CONTENT_TYPE, "application/json")
                .body(Full::new(Bytes::from(b))),
            None => builder.body(Full::new(Bytes::new())),
        }
        .map_err(|e| ChatError::Http(format!("invalid request for {}: {}", url, e)))?;

        let response = timeout(self.request_timeout, self.client.request(req))
            .await
            .map_err(|_| ChatError::Timeout(format!("{} {} timed out", method, url)))?
            .map_err(|e| ChatError::Http(format!("{} {}: {}", method, url, e)))?;

        let status = response.status();
        let bytes = timeout(self.request_timeout, response.into_body().collect())
            .await
            .map_err(|_| ChatError::Timeout(format!("{} {} body timed out", method, url)))?
            .map_err(|e| ChatError::Http(format!("body read error: {}", e)))?
            .to_bytes();

        if !status.is_success() {
            let message = error_message(status, &bytes);
            warn!(%request_id, status = status.as_u16(), %message, "api request failed");
            return Err(ChatError::Api {
                status: status.as_u16(),
                message,
            });
        }

        debug!(%request_id, status = status.as_u16(), len = bytes.len(), "api response");
        Ok(bytes)
    }
}

fn error_message(status: StatusCode, body: &[u8]) -> String {
    serde_json::from_slice::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.message.or(b.error))
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string()
        })
}

#[async_trait]
impl ChatApi for HttpChatApi {
    async fn list_conversations(&self) -> Result<Vec<Conversation>> {
        let body: ConversationsBody = self
            .request(Method::GET, self.url("/conversations"), None)
            .await?;
        Ok(match body {
            ConversationsBody::Wrapped { conversations } => conversations,
            ConversationsBody::Bare(list) => list,
        })
    }

    async fn get_conversation(&self, conversation_id: &str) -> Result<Conversation> {
        let path = format!("/conversations/{}", urlencoding::encode(conversation_id));
        let body: ConversationBody = self.request(Method::GET, self.url(&path), None).await?;
        Ok(match body {
            ConversationBody::Wrapped { conversation } => conversation,
            ConversationBody::Bare(c) => c,
        })
    }

    async fn create_conversation(&self, request: &NewConversation) -> Result<Conversation> {
        let payload = serde_json::to_vec(request)?;
        let body: ConversationBody = self
            .request(Method::POST, self.url("/conversations/new"), Some(payload))
            .await?;
        Ok(match body {
            ConversationBody::Wrapped { conversation } => conversation,
            ConversationBody::Bare(c) => c,
        })
    }

    async fn fetch_messages(
        &self,
        conversation_id: &str,
        cursor: Option<Cursor>,
    ) -> Result<MessagePage> {
        let mut path = format!(
            "/messages/conversation/{}",
            urlencoding::encode(conversation_id)
        );
        if let Some(cursor) = cursor {
            let iso = cursor.to_iso()?;
            path.push_str(&format!("?cursor={}", urlencoding::encode(&iso)));
        }
        self.request(Method::GET, self.url(&path), None).await
    }

    async fn send_message(&self, conversation_id: &str, content: &str) -> Result<Message> {
        let path = format!(
            "/messages/conversation/{}",
            urlencoding::encode(conversation_id)
        );
        let payload = serde_json::to_vec(&SendRequest { content })?;
        let body: MessageBody = self
            .request(Method::POST, self.url(&path), Some(payload))
            .await?;
        Ok(match body {
            MessageBody::Wrapped { message } => message,
            MessageBody::Bare(m) => m,
        })
    }

    async fn mark_read(&self, conversation_id: &str, message_ids: &[String]) -> Result<()> {
        let path = format!(
            "/messages/conversation/{}/read",
            urlencoding::encode(conversation_id)
        );
        let payload = serde_json::to_vec(&MarkReadRequest { message_ids })?;
        self.request_raw(Method::POST, self.url(&path), Some(payload))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_message_prefers_backend_text() {
        let msg = error_message(StatusCode::BAD_REQUEST, br#"{"message":"Content is required"}"#);
        assert_eq!(msg, "Content is required");

        let msg = error_message(StatusCode::FORBIDDEN, br#"{"error":"Not a participant"}"#);
        assert_eq!(msg, "Not a participant");
    }

    #[test]
    fn test_error_message_falls_back_to_reason() {
        assert_eq!(
            error_message(StatusCode::INTERNAL_SERVER_ERROR, b"<html>oops</html>"),
            "Internal Server Error"
        );
        assert_eq!(error_message(StatusCode::NOT_FOUND, br#"{"message":" "}"#), "Not Found");
    }

    #[tokio::test]
    async fn test_url_trims_trailing_slash() {
        let config = Config {
            base_url: "http://127.0.0.1:5000/api/".to_string(),
            viewer_id: "u1".to_string(),
            ..Default::default()
        };
        let api = HttpChatApi::new(&config);
        assert_eq!(api.url("/conversations"), "http://127.0.0.1:5000/api/conversations");
    }
}
