//! SDK client and controller against a real in-process server.

use std::sync::Arc;

use medchat::config::{AppConfig, StorageKind};
use medchat::llm::{CompletionProvider, Message as PromptMessage};
use medchat::server;
use medchat_sdk::controller::{ClearOutcome, Controller, MountOutcome, SendOutcome};
use medchat_sdk::{Client, Error, Role};

struct CannedProvider;

#[async_trait::async_trait]
impl CompletionProvider for CannedProvider {
    async fn complete(&self, _messages: Vec<PromptMessage>) -> anyhow::Result<String> {
        Ok("Fever is elevated body temperature.".into())
    }
}

async fn spawn_server(jwt_secret: Option<&str>) -> String {
    let mut config = AppConfig::load_from_args(["medchat"]).expect("config");
    config.storage.backend = StorageKind::Memory;
    config.resilience.rate_limit_enabled = false;
    if let Some(secret) = jwt_secret {
        config.security.jwt_required = true;
        config.security.jwt_secret = secret.into();
    }

    let state = server::build_state(Arc::new(config), Arc::new(CannedProvider))
        .await
        .expect("state");
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        axum::serve(listener, server::router(state)).await.ok();
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn test_client_round_trip() {
    let client = Client::new(spawn_server(None).await).expect("client");

    let health = client.health().await.expect("health");
    assert_eq!(health.status, "healthy");
    assert_eq!(health.ai_service, "available");

    let reply = client
        .chat()
        .send("patient 1", "What is fever?")
        .await
        .expect("send");
    assert_eq!(reply.response, "Fever is elevated body temperature.");
    assert_eq!(reply.history.len(), 2);
    assert_eq!(reply.history[0].role, Role::User);

    // ids with spaces survive the path round trip
    let history = client.chat().history("patient 1").await.expect("history");
    assert_eq!(history, reply.history);

    let list = client.chat().sessions().await.expect("sessions");
    assert_eq!(list.total_sessions, 1);
    assert_eq!(list.sessions[0].session_id, "patient 1");
    assert_eq!(list.sessions[0].message_count, 2);

    client.chat().clear("patient 1").await.expect("clear");
    assert!(client.chat().history("patient 1").await.expect("history").is_empty());

    let err = client.chat().send("patient 1", "  ").await.unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
}

#[tokio::test]
async fn test_controller_against_server() {
    let client = Client::new(spawn_server(None).await).expect("client");
    let mut controller = Controller::new(client, "s1");

    assert_eq!(controller.mount().await.expect("mount"), MountOutcome::Ready);
    assert!(controller.messages().is_empty());

    assert!(matches!(
        controller.send("What is fever?").await,
        SendOutcome::Sent
    ));
    assert_eq!(controller.messages().len(), 2);

    let outcome = controller.clear(|| true).await.expect("clear");
    assert_eq!(outcome, ClearOutcome::Cleared);
    assert!(controller.messages().is_empty());
}

#[tokio::test]
async fn test_rejected_credential_is_purged() {
    let client = Client::new(spawn_server(Some("sdk-secret")).await)
        .expect("client")
        .with_credential("not-a-valid-token");
    let mut controller = Controller::new(client, "s1").with_identity("Dr. Rivera");

    assert_eq!(
        controller.mount().await.expect("mount"),
        MountOutcome::Unauthenticated
    );
    assert!(!controller.backend().has_credential());
    assert!(controller.identity().is_none());
}
