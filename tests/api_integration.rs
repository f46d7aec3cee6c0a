//! End-to-end tests of the HTTP API against an in-memory store.

use std::sync::Arc;

use axum::http::StatusCode;
use axum_test::TestServer;
use jsonwebtoken::{EncodingKey, Header, encode};
use serde_json::{Value, json};

use medchat::config::{AppConfig, StorageKind};
use medchat::llm::{CompletionProvider, Message, MessageRole, UnavailableProvider};
use medchat::security::UserClaims;
use medchat::server;

const SECRET: &str = "integration-secret";

/// Replies with the number of prompt messages it was given.
struct CountingProvider;

#[async_trait::async_trait]
impl CompletionProvider for CountingProvider {
    async fn complete(&self, messages: Vec<Message>) -> anyhow::Result<String> {
        let last = messages
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::User)
            .map(|m| m.content.clone())
            .unwrap_or_default();
        Ok(format!("reply to {last} ({} prompt messages)", messages.len()))
    }
}

struct FailingProvider;

#[async_trait::async_trait]
impl CompletionProvider for FailingProvider {
    async fn complete(&self, _messages: Vec<Message>) -> anyhow::Result<String> {
        anyhow::bail!("upstream returned 503")
    }
}

fn test_config() -> AppConfig {
    let mut config = AppConfig::load_from_args(["medchat"]).expect("config");
    config.storage.backend = StorageKind::Memory;
    config.resilience.rate_limit_enabled = false;
    config
}

async fn server_with(config: AppConfig, provider: Arc<dyn CompletionProvider>) -> TestServer {
    let state = server::build_state(Arc::new(config), provider)
        .await
        .expect("state");
    TestServer::new(server::router(state)).expect("test server")
}

async fn default_server() -> TestServer {
    server_with(test_config(), Arc::new(CountingProvider)).await
}

fn token(exp_offset_secs: i64) -> String {
    let exp = chrono::Utc::now().timestamp() + exp_offset_secs;
    let claims = UserClaims {
        sub: "clinician-7".into(),
        name: Some("Test User".into()),
        exp: usize::try_from(exp).expect("positive exp"),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .expect("encode token")
}

#[tokio::test]
async fn test_send_returns_reply_and_history() {
    let server = default_server().await;

    let res = server
        .post("/api/chat")
        .json(&json!({"session_id": "s1", "message": "I have a headache"}))
        .await;
    res.assert_status_ok();

    let body: Value = res.json();
    // system prompt + new user message wrapped in the question template
    let response = body["response"].as_str().expect("response text");
    assert!(response.starts_with("reply to User Question: I have a headache\n"));
    assert!(response.ends_with("(2 prompt messages)"));
    let history = body["history"].as_array().expect("history array");
    assert_eq!(history.len(), 2);
    assert_eq!(history[0]["role"], "user");
    assert_eq!(history[0]["content"], "I have a headache");
    assert_eq!(history[1]["role"], "assistant");
    assert!(history[1]["timestamp"].is_string());
}

#[tokio::test]
async fn test_history_list_and_clear() {
    let server = default_server().await;

    for text in ["first", "second"] {
        server
            .post("/api/chat")
            .json(&json!({"session_id": "abc", "message": text}))
            .await
            .assert_status_ok();
    }
    server
        .post("/api/chat")
        .json(&json!({"session_id": "xyz", "message": "hello"}))
        .await
        .assert_status_ok();

    let history: Value = server.get("/api/sessions/abc/messages").await.json();
    assert_eq!(history.as_array().map(Vec::len), Some(4));
    assert_eq!(history[2]["content"], "second");

    let list: Value = server.get("/api/sessions").await.json();
    assert_eq!(list["total_sessions"], 2);
    // most recently active first
    assert_eq!(list["sessions"][0]["session_id"], "xyz");
    assert_eq!(list["sessions"][1]["message_count"], 4);

    let res = server.delete("/api/sessions/abc").await;
    res.assert_status_ok();
    let body: Value = res.json();
    assert_eq!(body["message"], "Session abc cleared successfully");

    let history: Value = server.get("/api/sessions/abc/messages").await.json();
    assert_eq!(history, json!([]));

    server.delete("/api/sessions").await.assert_status_ok();
    let list: Value = server.get("/api/sessions").await.json();
    assert_eq!(list["total_sessions"], 2);
    assert_eq!(list["sessions"][0]["message_count"], 0);
    assert_eq!(list["sessions"][1]["message_count"], 0);
}

#[tokio::test]
async fn test_unknown_session_reads_empty() {
    let server = default_server().await;

    let history: Value = server.get("/api/sessions/never-seen/messages").await.json();
    assert_eq!(history, json!([]));

    server.delete("/api/sessions/also-unknown").await.assert_status_ok();
}

#[tokio::test]
async fn test_validation_errors() {
    let server = default_server().await;

    let res = server
        .post("/api/chat")
        .json(&json!({"session_id": "s1", "message": "   "}))
        .await;
    res.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = res.json();
    assert_eq!(body["error"]["kind"], "validation");

    let res = server
        .post("/api/chat")
        .json(&json!({"message": "no session"}))
        .await;
    res.assert_status(StatusCode::BAD_REQUEST);

    // nothing was recorded
    let list: Value = server.get("/api/sessions").await.json();
    assert_eq!(list["total_sessions"], 0);
}

#[tokio::test]
async fn test_provider_failure_keeps_user_turn() {
    let server = server_with(test_config(), Arc::new(FailingProvider)).await;

    let res = server
        .post("/api/chat")
        .json(&json!({"session_id": "s1", "message": "hello"}))
        .await;
    res.assert_status(StatusCode::BAD_GATEWAY);
    let body: Value = res.json();
    assert_eq!(body["error"]["kind"], "provider");

    let history: Value = server.get("/api/sessions/s1/messages").await.json();
    let history = history.as_array().expect("array");
    assert_eq!(history.len(), 1);
    assert_eq!(history[0]["role"], "user");
}

#[tokio::test]
async fn test_health_and_info() {
    let server = server_with(
        test_config(),
        Arc::new(UnavailableProvider::new("LLM_BASE_URL not set")),
    )
    .await;

    let health: Value = server.get("/health").await.json();
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["ai_service"], "unavailable");
    assert!(health["timestamp"].is_string());

    let info: Value = server.get("/").await.json();
    assert!(info["endpoints"]["POST /api/chat"].is_string());
}

#[tokio::test]
async fn test_legacy_routes() {
    let server = default_server().await;

    let res = server
        .post("/send")
        .json(&json!({"session_id": "old", "message": "hi"}))
        .await;
    res.assert_status_ok();

    let history: Value = server.get("/history/old").await.json();
    assert_eq!(history.as_array().map(Vec::len), Some(2));

    let list: Value = server.get("/sessions").await.json();
    assert_eq!(list["total_sessions"], 1);

    server.delete("/sessions/old").await.assert_status_ok();
    server.delete("/sessions").await.assert_status_ok();
}

#[tokio::test]
async fn test_jwt_required() {
    let mut config = test_config();
    config.security.jwt_required = true;
    config.security.jwt_secret = SECRET.into();
    let server = server_with(config, Arc::new(CountingProvider)).await;

    let res = server.get("/api/sessions").await;
    res.assert_status(StatusCode::UNAUTHORIZED);
    let body: Value = res.json();
    assert_eq!(body["error"]["kind"], "auth");

    server
        .get("/api/sessions")
        .authorization_bearer("not-a-jwt")
        .await
        .assert_status(StatusCode::UNAUTHORIZED);

    server
        .get("/api/sessions")
        .authorization_bearer(token(-3600))
        .await
        .assert_status(StatusCode::UNAUTHORIZED);

    server
        .post("/api/chat")
        .authorization_bearer(token(3600))
        .json(&json!({"session_id": "s1", "message": "hello"}))
        .await
        .assert_status_ok();

    // health stays public
    server.get("/health").await.assert_status_ok();
}

#[tokio::test]
async fn test_rate_limit() {
    let mut config = test_config();
    config.resilience.rate_limit_enabled = true;
    config.resilience.requests_per_second = 0.001;
    config.resilience.burst_size = 2.0;
    let server = server_with(config, Arc::new(CountingProvider)).await;

    server.get("/health").await.assert_status_ok();
    server.get("/health").await.assert_status_ok();

    let res = server.get("/health").await;
    res.assert_status(StatusCode::TOO_MANY_REQUESTS);
    let body: Value = res.json();
    assert_eq!(body["error"]["kind"], "rate_limited");
}
