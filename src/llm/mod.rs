//! LLM driver traits and implementations.
//!
//! The conversation service only needs one thing from a language model: turn
//! a list of prompt messages into completion text. That contract is the
//! [`CompletionProvider`] trait. The production implementation is the
//! [`Orchestrator`], which drives a streaming [`LlmDriver`] and collects its
//! output.
//!
//! # Drivers
//!
//! - [`ChatCompletionsDriver`]: `OpenAI` Chat Completions API (`/v1/chat/completions`)
//!
//! # Example
//!
//! ```rust,ignore
//! use medchat::llm::{LlmSettings, Orchestrator, Provider};
//!
//! let settings = LlmSettings::new("https://api.openai.com", "gpt-4o-mini");
//! let orchestrator = Orchestrator::new(settings);
//! ```

pub mod chat_completions;
pub mod orchestrator;
pub mod prompt;
pub mod provider;

pub use chat_completions::ChatCompletionsDriver;
pub use orchestrator::Orchestrator;
pub use prompt::PromptBuilder;
pub use provider::Provider;

use std::pin::Pin;
use std::time::Duration;

use crate::normalized::NormalizedEvent;
use futures::Stream;

/// Default upper bound on one completion, including streaming.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// LLM connection and model settings.
#[derive(Clone)]
pub struct LlmSettings {
    /// Base URL for the LLM API (e.g., `https://api.openai.com`).
    pub base_url: String,
    /// Optional API key for authentication.
    pub api_key: Option<String>,
    /// Model identifier (e.g., `gpt-4o-mini`, `gemini-1.5-flash`).
    pub model: String,
    /// Provider type (auto-detected from `base_url` if not specified).
    pub provider: Provider,
    /// Sampling temperature, if the provider default should be overridden.
    pub temperature: Option<f32>,
    /// Upper bound on a single completion.
    pub timeout: Duration,
}

impl std::fmt::Debug for LlmSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmSettings")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("model", &self.model)
            .field("provider", &self.provider)
            .field("temperature", &self.temperature)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl LlmSettings {
    /// Settings with provider detection and defaults for everything optional.
    #[must_use]
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            provider: Provider::detect_from_url(&base_url),
            base_url,
            api_key: None,
            model: model.into(),
            temperature: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// A message sent to the model.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Message {
    /// Role of the message author.
    pub role: MessageRole,
    /// Text content of the message.
    pub content: String,
}

impl Message {
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// Role of a message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// System prompt.
    System,
    /// User message.
    User,
    /// Assistant response.
    Assistant,
}

/// Request to an LLM driver.
#[derive(Debug, Clone)]
pub struct LlmRequest {
    /// Correlates driver events and logs with the originating completion.
    pub request_id: String,
    /// Conversation messages, oldest first.
    pub messages: Vec<Message>,
}

/// Boxed stream of normalized events produced by a driver.
pub type EventStream = Pin<Box<dyn Stream<Item = anyhow::Result<NormalizedEvent>> + Send>>;

/// Trait for LLM streaming drivers.
///
/// Implementations of this trait provide streaming access to LLM responses,
/// emitting [`NormalizedEvent`]s as the model generates output.
#[async_trait::async_trait]
pub trait LlmDriver: Send + Sync {
    /// Stream a response from the LLM.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the connection is interrupted.
    async fn stream(&self, req: LlmRequest) -> anyhow::Result<EventStream>;
}

/// Text-completion function consumed by the conversation service.
#[async_trait::async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Produce the assistant reply for `messages`.
    ///
    /// Fails on transport errors, timeouts, provider-reported errors, and
    /// empty or malformed output.
    async fn complete(&self, messages: Vec<Message>) -> anyhow::Result<String>;

    /// Whether the provider is configured at all.
    fn is_available(&self) -> bool {
        true
    }
}

/// Stand-in used when no LLM settings were supplied at startup.
#[derive(Debug, Clone)]
pub struct UnavailableProvider {
    reason: String,
}

impl UnavailableProvider {
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait::async_trait]
impl CompletionProvider for UnavailableProvider {
    async fn complete(&self, _messages: Vec<Message>) -> anyhow::Result<String> {
        anyhow::bail!("AI service not available: {}", self.reason)
    }

    fn is_available(&self) -> bool {
        false
    }
}
