//! LLM orchestrator: drives a streaming driver to one completion.
//!
//! The orchestrator manages the lifecycle of a single completion:
//! 1. Send the prompt messages to the driver
//! 2. Accumulate streamed text deltas
//! 3. Stop at the provider's completion marker or end of stream
//! 4. Enforce the configured timeout and reject empty output
//!
//! # Example
//!
//! ```rust,ignore
//! use medchat::llm::{CompletionProvider, LlmSettings, Message, Orchestrator};
//!
//! let orchestrator = Orchestrator::new(LlmSettings::new("https://api.openai.com", "gpt-4o-mini"));
//! let reply = orchestrator.complete(vec![Message::user("What is fever?")]).await?;
//! ```

use std::sync::Arc;

use anyhow::{Context, anyhow, bail};
use futures::StreamExt;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::normalized::NormalizedEvent;

use super::{
    ChatCompletionsDriver, CompletionProvider, LlmDriver, LlmRequest, LlmSettings, Message,
};

/// Completion provider backed by a streaming [`LlmDriver`].
#[derive(Clone)]
pub struct Orchestrator {
    settings: LlmSettings,
    driver: Arc<dyn LlmDriver>,
}

#[allow(clippy::missing_fields_in_debug)]
impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("settings", &self.settings)
            .finish()
    }
}

impl Orchestrator {
    /// Create an orchestrator using the Chat Completions driver.
    #[must_use]
    pub fn new(settings: LlmSettings) -> Self {
        let driver = Arc::new(ChatCompletionsDriver::new(settings.clone()));
        Self { settings, driver }
    }

    /// Create an orchestrator around a custom driver.
    #[must_use]
    pub fn with_driver(settings: LlmSettings, driver: Arc<dyn LlmDriver>) -> Self {
        Self { settings, driver }
    }

    /// Get the LLM settings.
    #[must_use]
    pub fn settings(&self) -> &LlmSettings {
        &self.settings
    }

    async fn collect(&self, messages: Vec<Message>, request_id: &str) -> anyhow::Result<String> {
        let mut stream = self
            .driver
            .stream(LlmRequest {
                request_id: request_id.to_string(),
                messages,
            })
            .await
            .context("completion request failed")?;

        let mut text = String::new();
        while let Some(event) = stream.next().await {
            match event.context("completion stream interrupted")? {
                NormalizedEvent::StreamStart { request_id } => {
                    debug!(request_id = %request_id, "Completion stream started");
                }
                NormalizedEvent::MessageDelta { text: delta } => text.push_str(&delta),
                NormalizedEvent::Error { message } => bail!("provider reported: {message}"),
                NormalizedEvent::Done => break,
            }
        }

        debug!(request_id, chars = text.len(), "Completion collected");
        Ok(text)
    }
}

#[async_trait::async_trait]
impl CompletionProvider for Orchestrator {
    async fn complete(&self, messages: Vec<Message>) -> anyhow::Result<String> {
        let request_id = Uuid::new_v4().to_string();
        let timeout = self.settings.timeout;

        let text = tokio::time::timeout(timeout, self.collect(messages, &request_id))
            .await
            .map_err(|_elapsed| anyhow!("provider timed out after {}s", timeout.as_secs()))?
            .inspect_err(|e| warn!(request_id = %request_id, error = %e, "Completion failed"))?;

        if text.trim().is_empty() {
            bail!("provider returned an empty completion");
        }
        Ok(text)
    }
}
