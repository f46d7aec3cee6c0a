use axum::{
    Extension, Json, Router,
    extract::{DefaultBodyLimit, Path, Request, State, rejection::JsonRejection},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::AppState;
use crate::config::{AppConfig, StorageKind};
use crate::conversation::ConversationService;
use crate::error::{ChatError, error_response};
use crate::llm::prompt::{DEFAULT_SYSTEM_PROMPT, DEFAULT_USER_TEMPLATE};
use crate::llm::{CompletionProvider, Orchestrator, PromptBuilder, UnavailableProvider};
use crate::security::UserContext;
use crate::security::middleware::auth_middleware;
use crate::security::rate_limit::rate_limit_middleware;
use crate::session::{ChatMessage, JsonFileBackend, SessionStore, SessionSummary};

/// Request bodies above this size are rejected.
const BODY_LIMIT_BYTES: usize = 1024 * 1024;

/// Build the completion provider from the `LLM_*` environment.
///
/// Missing settings are not fatal: the returned provider reports itself as
/// unavailable and every send fails with a provider error.
pub fn provider_from_env() -> Arc<dyn CompletionProvider> {
    match crate::config::load_llm_settings() {
        Ok(settings) => {
            info!(
                name: "llm.config.loaded",
                base_url = %settings.base_url,
                model = %settings.model,
                provider = settings.provider.name(),
                "LLM configuration loaded"
            );
            Arc::new(Orchestrator::new(settings))
        }
        Err(e) => {
            warn!(name: "llm.config.missing", error = %e, "AI service unavailable");
            Arc::new(UnavailableProvider::new(e.to_string()))
        }
    }
}

/// Open the configured session store and wire up the conversation service.
pub async fn build_state(
    config: Arc<AppConfig>,
    provider: Arc<dyn CompletionProvider>,
) -> anyhow::Result<AppState> {
    let store = match config.storage.backend {
        StorageKind::Memory => SessionStore::new(),
        StorageKind::Json => {
            let backend = JsonFileBackend::open(&config.storage.path).await?;
            SessionStore::open(Arc::new(backend)).await?
        }
    };
    info!(
        name: "storage.loaded",
        backend = ?config.storage.backend,
        sessions = store.len().await,
        "Loaded chat sessions from storage"
    );

    let system_prompt = config
        .conversation
        .system_prompt
        .clone()
        .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string());
    let user_template = config
        .conversation
        .user_template
        .clone()
        .unwrap_or_else(|| DEFAULT_USER_TEMPLATE.to_string());
    let prompt = PromptBuilder::new(Some(system_prompt), config.conversation.context_messages)
        .with_user_template(Some(user_template));
    let conversation = Arc::new(ConversationService::new(store, provider, prompt));

    Ok(AppState::new(config, conversation))
}

/// Build the full router with middleware.
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/api/chat", post(api_send))
        .route(
            "/api/sessions",
            get(api_list_sessions).delete(api_clear_all_sessions),
        )
        .route("/api/sessions/{id}", delete(api_clear_session))
        .route("/api/sessions/{id}/messages", get(api_get_messages))
        // Legacy endpoints (for backward compatibility)
        .route("/send", post(api_send))
        .route("/history/{id}", get(api_get_messages))
        .route(
            "/sessions",
            get(api_list_sessions).delete(api_clear_all_sessions),
        )
        .route("/sessions/{id}", delete(api_clear_session))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let public = Router::new()
        .route("/", get(api_info))
        .route("/health", get(health));

    let timeout_duration = if state.config.resilience.timeout_disabled {
        Duration::from_secs(365 * 24 * 60 * 60) // 1 year
    } else {
        state.config.resilience.request_timeout()
    };

    public
        .merge(api)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .layer(middleware::from_fn(move |req: Request, next: Next| async move {
            match tokio::time::timeout(timeout_duration, next.run(req)).await {
                Ok(res) => res,
                Err(_elapsed) => {
                    error_response(StatusCode::REQUEST_TIMEOUT, "timeout", "Request timed out")
                }
            }
        }))
        .layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the Axum server with the provided configuration.
pub async fn start_server(
    config: Arc<AppConfig>,
    provider: Arc<dyn CompletionProvider>,
) -> anyhow::Result<()> {
    let state = build_state(Arc::clone(&config), provider).await?;
    let app = router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!(
        name: "server.started",
        address = %addr,
        "Server started"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!(name: "server.stopped", "Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// API Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// Request body for the send API.
#[derive(Debug, Deserialize)]
struct SendRequest {
    /// Session to append to.
    session_id: String,
    /// User message content.
    message: String,
}

/// Response from the send API.
#[derive(Debug, Serialize)]
struct SendResponse {
    /// Assistant reply text.
    response: String,
    /// Full session history after the exchange.
    history: Vec<ChatMessage>,
}

#[derive(Debug, Serialize)]
struct SessionList {
    total_sessions: usize,
    sessions: Vec<SessionSummary>,
}

#[derive(Debug, Serialize)]
struct Confirmation {
    message: String,
}

#[derive(Debug, Serialize)]
struct Health {
    status: &'static str,
    ai_service: &'static str,
    timestamp: DateTime<Utc>,
}

/// POST /api/chat - Send a message and receive the reply with updated history.
async fn api_send(
    State(state): State<AppState>,
    user: Option<Extension<UserContext>>,
    body: Result<Json<SendRequest>, JsonRejection>,
) -> Result<Json<SendResponse>, Response> {
    let Json(req) = match body {
        Ok(json) => json,
        Err(rejection) if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE => {
            return Err(error_response(
                rejection.status(),
                "validation",
                rejection.body_text(),
            ));
        }
        Err(rejection) => {
            return Err(ChatError::Validation(rejection.body_text()).into_response());
        }
    };

    if let Some(Extension(user)) = &user {
        debug!(user_id = %user.user_id, session_id = %req.session_id, "Authenticated send");
    }

    let reply = state
        .conversation
        .send(&req.session_id, &req.message)
        .await
        .map_err(IntoResponse::into_response)?;

    Ok(Json(SendResponse {
        response: reply.assistant_text,
        history: reply.history,
    }))
}

/// GET /api/sessions/{id}/messages - Get session messages.
async fn api_get_messages(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Json<Vec<ChatMessage>> {
    Json(state.conversation.get_history(&id).await)
}

/// GET /api/sessions - List all sessions.
async fn api_list_sessions(State(state): State<AppState>) -> Json<SessionList> {
    let sessions = state.conversation.list_sessions().await;
    Json(SessionList {
        total_sessions: sessions.len(),
        sessions,
    })
}

/// DELETE /api/sessions/{id} - Clear one session's history.
async fn api_clear_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Confirmation>, ChatError> {
    state.conversation.clear_session(&id).await?;
    Ok(Json(Confirmation {
        message: format!("Session {id} cleared successfully"),
    }))
}

/// DELETE /api/sessions - Clear every session's history.
async fn api_clear_all_sessions(
    State(state): State<AppState>,
) -> Result<Json<Confirmation>, ChatError> {
    state.conversation.clear_all_sessions().await?;
    Ok(Json(Confirmation {
        message: "All sessions cleared successfully".to_string(),
    }))
}

/// GET /health - Liveness and provider availability.
async fn health(State(state): State<AppState>) -> Json<Health> {
    Json(Health {
        status: "healthy",
        ai_service: if state.conversation.provider_available() {
            "available"
        } else {
            "unavailable"
        },
        timestamp: Utc::now(),
    })
}

/// GET / - API description.
async fn api_info() -> impl IntoResponse {
    Json(serde_json::json!({
        "message": "Medical Assistant Chatbot API",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "POST /api/chat": "Send a message and get response",
            "GET /api/sessions/{id}/messages": "Get chat history for a session",
            "GET /api/sessions": "List all chat sessions",
            "DELETE /api/sessions/{id}": "Clear chat history for a session",
            "DELETE /api/sessions": "Clear all chat history",
            "GET /health": "Health check"
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request as HttpRequest, header};
    use tower::ServiceExt;

    use crate::llm::Message;

    struct SlowProvider;

    #[async_trait::async_trait]
    impl CompletionProvider for SlowProvider {
        async fn complete(&self, _messages: Vec<Message>) -> anyhow::Result<String> {
            tokio::time::sleep(Duration::from_secs(600)).await;
            Ok("too late".into())
        }
    }

    async fn test_router(request_timeout_secs: u64) -> Router {
        let mut config = AppConfig::load_from_args(["medchat"]).expect("config");
        config.storage.backend = StorageKind::Memory;
        config.resilience.rate_limit_enabled = false;
        config.resilience.request_timeout_secs = request_timeout_secs;
        let state = build_state(Arc::new(config), Arc::new(SlowProvider))
            .await
            .expect("state");
        router(state)
    }

    fn chat_request(body: impl Into<Body>) -> HttpRequest<Body> {
        HttpRequest::post("/api/chat")
            .header(header::CONTENT_TYPE, "application/json")
            .body(body.into())
            .expect("request")
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_request_times_out() {
        let app = test_router(5).await;

        let res = app
            .oneshot(chat_request(r#"{"session_id":"s1","message":"hello"}"#))
            .await
            .expect("response");
        assert_eq!(res.status(), StatusCode::REQUEST_TIMEOUT);
    }

    #[tokio::test]
    async fn test_oversized_body_rejected() {
        let app = test_router(90).await;
        let message = "a".repeat(BODY_LIMIT_BYTES + 1);
        let body = serde_json::json!({"session_id": "s1", "message": message}).to_string();

        let res = app.oneshot(chat_request(body)).await.expect("response");
        assert_eq!(res.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_malformed_json_is_validation_error() {
        let app = test_router(90).await;

        let res = app
            .oneshot(chat_request("{not json"))
            .await
            .expect("response");
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }
}
