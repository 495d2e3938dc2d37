/// HTTP client tests
/// Run HttpChatApi against a canned backend served by hyper on a local port

use bytes::Bytes;
use campuslink_core::api::{ChatApi, HttpChatApi};
use campuslink_core::client::{ChatClient, Outcome};
use campuslink_core::config::Config;
use campuslink_core::cursor::Cursor;
use campuslink_core::error::ChatError;
use campuslink_core::model::{ConversationKind, NewConversation};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::header::{AUTHORIZATION, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;

#[derive(Debug, Clone)]
struct Recorded {
    method: Method,
    path: String,
    query: Option<String>,
    authorization: Option<String>,
    has_request_id: bool,
    body: Option<Value>,
}

type Log = Arc<Mutex<Vec<Recorded>>>;

fn participant(id: &str, first: &str) -> Value {
    json!({ "id": id, "firstName": first, "lastName": "Student", "headline": "Physics" })
}

fn conversation(id: &str) -> Value {
    json!({
        "id": id,
        "type": "direct",
        "participants": [participant("me", "Ana"), participant("u2", "Ben")],
        "updatedAt": "2023-11-14T22:13:20.000Z"
    })
}

fn message(id: &str, sender: &str, content: &str, created_at: &str) -> Value {
    json!({
        "id": id,
        "sender": participant(sender, "X"),
        "content": content,
        "createdAt": created_at,
        "status": "delivered"
    })
}

async fn route(method: &Method, path: &str, body: Option<&Value>) -> (StatusCode, Value) {
    match (method, path) {
        (&Method::GET, "/api/conversations") => (
            StatusCode::OK,
            json!({ "conversations": [conversation("c1"), conversation("c2")] }),
        ),
        (&Method::GET, "/api/conversations/c1") => (StatusCode::OK, conversation("c1")),
        (&Method::GET, "/api/conversations/slow") => {
            tokio::time::sleep(Duration::from_millis(500)).await;
            (StatusCode::OK, conversation("slow"))
        }
        (&Method::POST, "/api/conversations/new") => {
            (StatusCode::CREATED, json!({ "conversation": conversation("c9") }))
        }
        (&Method::GET, "/api/messages/conversation/c1") => (
            StatusCode::OK,
            json!({
                "messages": [
                    message("m2", "me", "second", "2023-11-14T22:13:22.000Z"),
                    message("m1", "u2", "first", "2023-11-14T22:13:21.000Z"),
                ],
                "pagination": { "totalCount": 12, "fetchedCount": 2, "remainingCount": 10, "hasMore": true },
                "cursor": 1_700_000_001_000i64
            }),
        ),
        (&Method::POST, "/api/messages/conversation/c1") => {
            let content = body
                .and_then(|b| b["content"].as_str())
                .unwrap_or_default()
                .to_string();
            if content.is_empty() {
                (StatusCode::BAD_REQUEST, json!({ "message": "Content is required" }))
            } else {
                (
                    StatusCode::CREATED,
                    json!({ "message": message("m3", "me", &content, "2023-11-14T22:13:23.000Z") }),
                )
            }
        }
        (&Method::POST, "/api/messages/conversation/c1/read") => {
            (StatusCode::OK, json!({ "success": true }))
        }
        (&Method::GET, "/api/conversations/forbidden") => {
            (StatusCode::FORBIDDEN, json!({ "error": "Not a participant" }))
        }
        _ => (StatusCode::NOT_FOUND, json!({ "message": "Conversation not found" })),
    }
}

async fn handle(
    req: Request<Incoming>,
    log: Log,
) -> std::result::Result<Response<Full<Bytes>>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let query = req.uri().query().map(str::to_string);
    let authorization = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let has_request_id = req.headers().contains_key("x-request-id");
    let raw = req.into_body().collect().await?.to_bytes();
    let body: Option<Value> = serde_json::from_slice(&raw).ok();

    log.lock().unwrap().push(Recorded {
        method: method.clone(),
        path: path.clone(),
        query,
        authorization,
        has_request_id,
        body: body.clone(),
    });

    let (status, json) = route(&method, &path, body.as_ref()).await;
    Ok(Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from(json.to_string())))
        .unwrap())
}

async fn spawn_backend() -> (String, Log) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let server_log = log.clone();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let io = TokioIo::new(stream);
            let log = server_log.clone();
            tokio::spawn(async move {
                let service = service_fn(move |req| handle(req, log.clone()));
                let _ = http1::Builder::new().serve_connection(io, service).await;
            });
        }
    });

    (format!("http://{}/api/", addr), log)
}

fn api_for(base_url: &str) -> HttpChatApi {
    let config = Config {
        base_url: base_url.to_string(),
        viewer_id: "me".to_string(),
        token: Some("secret-token".to_string()),
        request_timeout: Duration::from_millis(200),
        ..Default::default()
    };
    HttpChatApi::new(&config)
}

fn last(log: &Log) -> Recorded {
    log.lock().unwrap().last().cloned().unwrap()
}

#[tokio::test]
async fn test_list_conversations_unwraps_body_and_sends_headers() {
    let (base, log) = spawn_backend().await;
    let api = api_for(&base);

    let list = api.list_conversations().await.unwrap();
    assert_eq!(list.len(), 2);
    assert_eq!(list[0].id, "c1");
    assert_eq!(list[0].kind, ConversationKind::Direct);
    assert_eq!(list[0].participants[1].first_name, "Ben");

    let req = last(&log);
    assert_eq!(req.method, Method::GET);
    assert_eq!(req.path, "/api/conversations");
    assert_eq!(req.authorization.as_deref(), Some("Bearer secret-token"));
    assert!(req.has_request_id);
}

#[tokio::test]
async fn test_get_conversation_accepts_bare_body() {
    let (base, _log) = spawn_backend().await;
    let api = api_for(&base);

    let conversation = api.get_conversation("c1").await.unwrap();
    assert_eq!(conversation.id, "c1");
    assert_eq!(conversation.other_participant("me").unwrap().id, "u2");
}

#[tokio::test]
async fn test_fetch_messages_sends_iso_cursor() {
    let (base, log) = spawn_backend().await;
    let api = api_for(&base);

    let page = api.fetch_messages("c1", None).await.unwrap();
    assert_eq!(last(&log).query, None);
    assert_eq!(page.messages.len(), 2);
    assert_eq!(page.messages[0].id, "m2");
    assert_eq!(page.pagination.total_count, 12);
    assert!(page.pagination.has_more);
    assert_eq!(page.cursor, Some(Cursor::from_millis(1_700_000_001_000)));

    api.fetch_messages("c1", Some(Cursor::from_millis(1_700_000_000_123)))
        .await
        .unwrap();
    assert_eq!(
        last(&log).query.as_deref(),
        Some("cursor=2023-11-14T22%3A13%3A20.123Z")
    );
}

#[tokio::test]
async fn test_send_message_posts_content() {
    let (base, log) = spawn_backend().await;
    let api = api_for(&base);

    let sent = api.send_message("c1", "see you at noon").await.unwrap();
    assert_eq!(sent.id, "m3");
    assert_eq!(sent.content, "see you at noon");

    let req = last(&log);
    assert_eq!(req.method, Method::POST);
    assert_eq!(req.path, "/api/messages/conversation/c1");
    assert_eq!(req.body, Some(json!({ "content": "see you at noon" })));
}

#[tokio::test]
async fn test_create_conversation_body() {
    let (base, log) = spawn_backend().await;
    let api = api_for(&base);

    let created = api
        .create_conversation(&NewConversation::direct("u2"))
        .await
        .unwrap();
    assert_eq!(created.id, "c9");
    assert_eq!(
        last(&log).body,
        Some(json!({ "participantIds": ["u2"], "type": "direct" }))
    );
}

#[tokio::test]
async fn test_mark_read_body() {
    let (base, log) = spawn_backend().await;
    let api = api_for(&base);

    api.mark_read("c1", &["m1".to_string()]).await.unwrap();
    let req = last(&log);
    assert_eq!(req.path, "/api/messages/conversation/c1/read");
    assert_eq!(req.body, Some(json!({ "messageIds": ["m1"] })));
}

#[tokio::test]
async fn test_error_bodies_are_surfaced() {
    let (base, _log) = spawn_backend().await;
    let api = api_for(&base);

    match api.get_conversation("missing").await {
        Err(ChatError::Api { status, message }) => {
            assert_eq!(status, 404);
            assert_eq!(message, "Conversation not found");
        }
        other => panic!("expected api error, got {:?}", other),
    }
    let err = api.get_conversation("forbidden").await.unwrap_err();
    assert_eq!(err.user_message(), "Not a participant");

    let err = api.send_message("c1", "").await.unwrap_err();
    assert_eq!(err.user_message(), "Content is required");
}

#[tokio::test]
async fn test_slow_backend_times_out() {
    let (base, _log) = spawn_backend().await;
    let api = api_for(&base);

    let err = api.get_conversation("slow").await.unwrap_err();
    assert!(matches!(err, ChatError::Timeout(_)), "got {:?}", err);
}

#[tokio::test]
async fn test_unreachable_backend_is_http_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let api = api_for(&format!("http://{}/api", addr));
    let err = api.list_conversations().await.unwrap_err();
    assert!(matches!(err, ChatError::Http(_)), "got {:?}", err);
}

#[tokio::test]
async fn test_client_over_http_opens_and_sends() {
    let (base, log) = spawn_backend().await;
    let client = ChatClient::new(Arc::new(api_for(&base)), "me");

    client.load_conversations().await.unwrap();
    assert_eq!(client.open_conversation("c1").await.unwrap(), Outcome::Applied(2));
    let sent = client.send_message("c1", "  hi  ").await.unwrap().applied().unwrap();
    assert_eq!(sent.content, "hi");

    let state = client.snapshot().await;
    let ids: Vec<&str> = state.open.messages.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, vec!["m1", "m2", "m3"]);
    assert_eq!(state.conversations.items[0].id, "c1");
    assert_eq!(state.open.cursor.total_count, 13);

    let sends = log
        .lock()
        .unwrap()
        .iter()
        .filter(|r| r.method == Method::POST)
        .count();
    assert_eq!(sends, 1);
}
