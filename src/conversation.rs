//! Conversation service: one user turn in, one assistant turn out.
//!
//! [`ConversationService::send`] appends the user message, asks the
//! completion provider for a reply, appends that reply, and returns the
//! updated history. Calls for the same session run one at a time; calls for
//! different sessions run concurrently.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{Mutex, MutexGuard, OwnedMutexGuard};
use tracing::{info, instrument, warn};

use crate::error::ChatError;
use crate::llm::{CompletionProvider, PromptBuilder};
use crate::session::{ChatMessage, SessionStore, SessionSummary};

/// Result of a successful send.
#[derive(Debug, Clone, Serialize)]
pub struct ChatReply {
    /// Text of the assistant turn that was appended.
    pub assistant_text: String,
    /// Full session history including both new turns.
    pub history: Vec<ChatMessage>,
}

/// Keyed mutual exclusion: one async mutex per session id.
///
/// Entries are never evicted; sessions themselves are never removed either.
#[derive(Debug, Default)]
struct SessionLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SessionLocks {
    async fn acquire(&self, session_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.locks.lock().await;
            Arc::clone(map.entry(session_id.to_string()).or_default())
        };
        lock.lock_owned().await
    }

    /// Lock every known session in id order.
    ///
    /// The returned map guard keeps new sessions from starting a send until
    /// the caller is done.
    async fn acquire_all(
        &self,
    ) -> (
        MutexGuard<'_, HashMap<String, Arc<Mutex<()>>>>,
        Vec<OwnedMutexGuard<()>>,
    ) {
        let map = self.locks.lock().await;
        let mut entries: Vec<(&String, &Arc<Mutex<()>>)> = map.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        let locks: Vec<Arc<Mutex<()>>> = entries.into_iter().map(|(_, l)| Arc::clone(l)).collect();

        let mut guards = Vec::with_capacity(locks.len());
        for lock in locks {
            guards.push(lock.lock_owned().await);
        }
        (map, guards)
    }
}

/// Mediates between HTTP handlers, the session store and the provider.
pub struct ConversationService {
    store: SessionStore,
    provider: Arc<dyn CompletionProvider>,
    prompt: PromptBuilder,
    locks: SessionLocks,
}

impl std::fmt::Debug for ConversationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationService")
            .field("store", &self.store)
            .field("provider_available", &self.provider.is_available())
            .field("prompt", &self.prompt)
            .finish_non_exhaustive()
    }
}

impl ConversationService {
    #[must_use]
    pub fn new(
        store: SessionStore,
        provider: Arc<dyn CompletionProvider>,
        prompt: PromptBuilder,
    ) -> Self {
        Self {
            store,
            provider,
            prompt,
            locks: SessionLocks::default(),
        }
    }

    /// Underlying session store.
    #[must_use]
    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Whether a real completion provider is configured.
    #[must_use]
    pub fn provider_available(&self) -> bool {
        self.provider.is_available()
    }

    /// Send one user message and obtain the assistant reply.
    ///
    /// If the provider fails, the user turn stays in the history and no
    /// assistant turn is recorded.
    #[instrument(skip(self, user_text))]
    pub async fn send(&self, session_id: &str, user_text: &str) -> Result<ChatReply, ChatError> {
        if session_id.trim().is_empty() {
            return Err(ChatError::Validation("session_id must not be empty".into()));
        }
        if user_text.trim().is_empty() {
            return Err(ChatError::Validation("message must not be empty".into()));
        }

        let _turn = self.locks.acquire(session_id).await;

        let history = self
            .store
            .append(session_id, ChatMessage::user(user_text))
            .await?;
        let prior = &history[..history.len() - 1];
        let prompt = self.prompt.build(prior, user_text);

        let assistant_text = match self.provider.complete(prompt).await {
            Ok(text) => text,
            Err(e) => {
                warn!(name: "chat.provider.failed", error = %e, "Completion provider failed");
                return Err(ChatError::Provider(format!("{e:#}")));
            }
        };

        let history = self
            .store
            .append(session_id, ChatMessage::assistant(assistant_text.clone()))
            .await?;

        info!(
            name: "chat.turn.completed",
            messages = history.len(),
            "Chat turn completed"
        );

        Ok(ChatReply {
            assistant_text,
            history,
        })
    }

    /// Full history of a session; empty for unseen ids.
    pub async fn get_history(&self, session_id: &str) -> Vec<ChatMessage> {
        self.store.get_history(session_id).await
    }

    /// Summaries of all known sessions.
    pub async fn list_sessions(&self) -> Vec<SessionSummary> {
        self.store.list_sessions().await
    }

    /// Reset one session to empty.
    ///
    /// Waits for an in-flight send on the same session to finish first.
    pub async fn clear_session(&self, session_id: &str) -> Result<(), ChatError> {
        let _turn = self.locks.acquire(session_id).await;
        self.store.clear(session_id).await?;
        info!(name: "chat.session.cleared", session_id, "Session cleared");
        Ok(())
    }

    /// Reset every session to empty.
    pub async fn clear_all_sessions(&self) -> Result<(), ChatError> {
        let _turns = self.locks.acquire_all().await;
        self.store.clear_all().await?;
        info!(name: "chat.sessions.cleared", "All sessions cleared");
        Ok(())
    }
}
