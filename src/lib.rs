//! Medical assistant chat backend.
//!
//! A session-scoped conversation API: clients post a message for a session,
//! the server records it, asks an OpenAI-compatible language model for a
//! reply, records that too, and returns the updated history.
//!
//! # Architecture
//!
//! - **Server**: Axum HTTP API with auth, rate limiting and timeouts
//! - **Conversation Service**: per-session serialized send flow
//! - **Session Store**: ordered history per session, memory or JSON file backed
//! - **LLM**: streaming Chat Completions driver behind a completion trait
//!
//! # Modules
//!
//! - [`config`]: Layered configuration (defaults, file, env, CLI)
//! - [`conversation`]: The send / history / clear operations
//! - [`error`]: Error taxonomy and HTTP mapping
//! - [`llm`]: Completion provider traits and implementations
//! - [`normalized`]: Unified streaming event model
//! - [`security`]: Bearer-token auth and rate limiting
//! - [`server`]: Router and request handlers
//! - [`session`]: Conversation and session management
//! - [`telemetry`]: Tracing subscriber setup

// Allow pedantic clippy warnings that don't add value for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::missing_fields_in_debug)]
#![allow(clippy::implicit_hasher)]
#![allow(clippy::cargo_common_metadata)]
#![allow(clippy::multiple_crate_versions)]
#![allow(clippy::unused_async)]

pub mod config;
pub mod conversation;
pub mod error;
pub mod llm;
pub mod normalized;
pub mod security;
pub mod server;
pub mod session;
pub mod telemetry;

use std::sync::Arc;

use jsonwebtoken::DecodingKey;

use crate::config::AppConfig;
use conversation::ConversationService;
use security::RateLimiter;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Send / history / clear operations.
    pub conversation: Arc<ConversationService>,
    /// Global Rate Limiter
    pub rate_limiter: Arc<RateLimiter>,
    /// Global Configuration
    pub config: Arc<AppConfig>,
    /// Key for bearer-token verification; `None` when no secret is configured.
    pub decoding_key: Option<Arc<DecodingKey>>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("conversation", &self.conversation)
            .field("rate_limiter", &self.rate_limiter)
            .field("config", &self.config)
            .field("auth_enabled", &self.decoding_key.is_some())
            .finish()
    }
}

impl AppState {
    /// Assemble state from configuration and a ready conversation service.
    #[must_use]
    pub fn new(config: Arc<AppConfig>, conversation: Arc<ConversationService>) -> Self {
        let decoding_key = (!config.security.jwt_secret.is_empty())
            .then(|| Arc::new(DecodingKey::from_secret(config.security.jwt_secret.as_bytes())));
        let rate_limiter = Arc::new(RateLimiter::new(
            config.resilience.requests_per_second,
            config.resilience.burst_size,
        ));

        Self {
            conversation,
            rate_limiter,
            config,
            decoding_key,
        }
    }
}
