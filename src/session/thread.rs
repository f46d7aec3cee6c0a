//! Conversation thread and session storage.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use super::ChatMessage;
use super::storage::{MemoryBackend, SessionBackend};
use crate::error::StorageError;

/// Number of characters of the last message shown in a session summary.
const PREVIEW_CHARS: usize = 100;

/// A single conversation session.
///
/// Cloning is cheap; clones share the same underlying history. All access to
/// the history goes through one async mutex, which makes each append or clear
/// atomic with respect to any other operation on the same session.
#[derive(Debug, Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

#[derive(Debug)]
struct SessionInner {
    id: String,
    state: Mutex<SessionState>,
}

#[derive(Debug)]
struct SessionState {
    messages: Vec<ChatMessage>,
    created_at: DateTime<Utc>,
    last_active: DateTime<Utc>,
}

/// Summary of one session as reported by [`SessionStore::list_sessions`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub message_count: usize,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
    pub last_message_preview: Option<String>,
}

impl Session {
    fn new(id: String, messages: Vec<ChatMessage>) -> Self {
        let now = Utc::now();
        let created_at = messages.first().map_or(now, |m| m.timestamp);
        let last_active = messages.last().map_or(now, |m| m.timestamp);
        Self {
            inner: Arc::new(SessionInner {
                id,
                state: Mutex::new(SessionState {
                    messages,
                    created_at,
                    last_active,
                }),
            }),
        }
    }

    /// Get the session ID.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Get all messages in append order.
    pub async fn messages(&self) -> Vec<ChatMessage> {
        self.inner.state.lock().await.messages.clone()
    }

    /// Get the number of messages in the conversation.
    pub async fn message_count(&self) -> usize {
        self.inner.state.lock().await.messages.len()
    }

    /// Summarize the session for listings.
    pub async fn summary(&self) -> SessionSummary {
        let state = self.inner.state.lock().await;
        SessionSummary {
            session_id: self.inner.id.clone(),
            message_count: state.messages.len(),
            created_at: state.created_at,
            last_active: state.last_active,
            last_message_preview: state.messages.last().map(|m| preview(&m.content)),
        }
    }

    /// Append a message, persisting through `backend` before committing.
    async fn append(
        &self,
        message: ChatMessage,
        backend: &dyn SessionBackend,
    ) -> Result<Vec<ChatMessage>, StorageError> {
        let mut state = self.inner.state.lock().await;
        let mut next = state.messages.clone();
        next.push(message);

        backend.save(&self.inner.id, &next).await?;

        state.messages.clone_from(&next);
        state.last_active = Utc::now();
        Ok(next)
    }

    /// Reset the history to empty, persisting through `backend` first.
    async fn clear(&self, backend: &dyn SessionBackend) -> Result<(), StorageError> {
        let mut state = self.inner.state.lock().await;
        if state.messages.is_empty() {
            return Ok(());
        }

        backend.save(&self.inner.id, &[]).await?;

        state.messages.clear();
        state.last_active = Utc::now();
        Ok(())
    }
}

fn preview(content: &str) -> String {
    let mut chars = content.chars();
    let head: String = chars.by_ref().take(PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

/// Thread-safe store for sessions.
///
/// Holds at most one [`Session`] per identifier. Sessions come into existence
/// on first append or first history read and are never removed; clearing a
/// session resets it to an empty history.
#[derive(Debug, Clone)]
pub struct SessionStore {
    inner: Arc<SessionStoreInner>,
}

#[derive(Debug)]
struct SessionStoreInner {
    sessions: RwLock<HashMap<String, Session>>,
    backend: Arc<dyn SessionBackend>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    /// Create an empty, memory-only session store.
    #[must_use]
    pub fn new() -> Self {
        Self::with_backend(Arc::new(MemoryBackend))
    }

    /// Create an empty store that persists through `backend`.
    ///
    /// Whatever the backend already holds is ignored; use [`SessionStore::open`]
    /// to restore it.
    #[must_use]
    pub fn with_backend(backend: Arc<dyn SessionBackend>) -> Self {
        Self {
            inner: Arc::new(SessionStoreInner {
                sessions: RwLock::new(HashMap::new()),
                backend,
            }),
        }
    }

    /// Create a store pre-populated with everything `backend` has persisted.
    pub async fn open(backend: Arc<dyn SessionBackend>) -> Result<Self, StorageError> {
        let persisted = backend.load_all().await?;
        let sessions = persisted
            .into_iter()
            .map(|(id, messages)| (id.clone(), Session::new(id, messages)))
            .collect();

        Ok(Self {
            inner: Arc::new(SessionStoreInner {
                sessions: RwLock::new(sessions),
                backend,
            }),
        })
    }

    /// Get a session by ID.
    pub async fn get(&self, id: &str) -> Option<Session> {
        self.inner.sessions.read().await.get(id).cloned()
    }

    /// Get a session by ID, creating it if it doesn't exist.
    pub async fn get_or_create(&self, id: &str) -> Session {
        if let Some(session) = self.get(id).await {
            return session;
        }

        let mut guard = self.inner.sessions.write().await;
        guard
            .entry(id.to_string())
            .or_insert_with(|| {
                debug!(session_id = %id, "Session created");
                Session::new(id.to_string(), Vec::new())
            })
            .clone()
    }

    /// Append `message` to the end of the session, creating it if absent.
    ///
    /// Returns the full updated history. On a storage failure nothing changes.
    pub async fn append(
        &self,
        session_id: &str,
        message: ChatMessage,
    ) -> Result<Vec<ChatMessage>, StorageError> {
        let session = self.get_or_create(session_id).await;
        session.append(message, self.inner.backend.as_ref()).await
    }

    /// Full history of a session in append order. Empty for unseen ids.
    ///
    /// An unseen id is registered in memory so it shows up in
    /// [`SessionStore::list_sessions`], but nothing is written to the backend
    /// until its first append. After a restart it is gone again.
    pub async fn get_history(&self, session_id: &str) -> Vec<ChatMessage> {
        self.get_or_create(session_id).await.messages().await
    }

    /// Summaries for every known session, most recently active first.
    pub async fn list_sessions(&self) -> Vec<SessionSummary> {
        let sessions: Vec<Session> = self.inner.sessions.read().await.values().cloned().collect();

        let mut summaries = Vec::with_capacity(sessions.len());
        for session in &sessions {
            summaries.push(session.summary().await);
        }
        summaries.sort_by(|a, b| {
            b.last_active
                .cmp(&a.last_active)
                .then_with(|| a.session_id.cmp(&b.session_id))
        });
        summaries
    }

    /// Reset a session to an empty history. Unknown ids succeed silently.
    pub async fn clear(&self, session_id: &str) -> Result<(), StorageError> {
        match self.get(session_id).await {
            Some(session) => session.clear(self.inner.backend.as_ref()).await,
            None => Ok(()),
        }
    }

    /// Reset every known session to an empty history.
    pub async fn clear_all(&self) -> Result<(), StorageError> {
        let mut sessions: Vec<Session> =
            self.inner.sessions.read().await.values().cloned().collect();
        // Fixed lock order keeps concurrent clear_all calls from deadlocking.
        sessions.sort_by(|a, b| a.id().cmp(b.id()));

        let mut guards = Vec::with_capacity(sessions.len());
        for session in &sessions {
            guards.push(session.inner.state.lock().await);
        }

        self.inner.backend.clear_all().await?;

        let now = Utc::now();
        for state in &mut guards {
            if !state.messages.is_empty() {
                state.messages.clear();
                state.last_active = now;
            }
        }
        Ok(())
    }

    /// Get the number of known sessions.
    pub async fn len(&self) -> usize {
        self.inner.sessions.read().await.len()
    }

    /// Check if there are no sessions.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Role;
    use async_trait::async_trait;

    #[derive(Debug)]
    struct FailingBackend;

    #[async_trait]
    impl SessionBackend for FailingBackend {
        async fn load_all(&self) -> Result<HashMap<String, Vec<ChatMessage>>, StorageError> {
            Ok(HashMap::new())
        }

        async fn save(&self, _: &str, _: &[ChatMessage]) -> Result<(), StorageError> {
            Err(StorageError::Unavailable("disk on fire".into()))
        }

        async fn clear_all(&self) -> Result<(), StorageError> {
            Err(StorageError::Unavailable("disk on fire".into()))
        }
    }

    #[tokio::test]
    async fn test_append_preserves_order() {
        let store = SessionStore::new();

        store.append("s1", ChatMessage::user("one")).await.unwrap();
        store.append("s1", ChatMessage::assistant("two")).await.unwrap();
        let history = store.append("s1", ChatMessage::user("three")).await.unwrap();

        let contents: Vec<&str> = history.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["one", "two", "three"]);
        assert_eq!(store.get_history("s1").await, history);
    }

    #[tokio::test]
    async fn test_unknown_session_is_empty() {
        let store = SessionStore::new();

        assert!(store.get_history("never-seen").await.is_empty());
        // Reading registers the identifier.
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_read_only_session_is_not_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        let backend = crate::session::JsonFileBackend::open(&path).await.unwrap();
        let store = SessionStore::open(Arc::new(backend)).await.unwrap();

        store.append("kept", ChatMessage::user("hello")).await.unwrap();
        assert!(store.get_history("looked-at").await.is_empty());
        assert_eq!(store.len().await, 2);

        let reopened = crate::session::JsonFileBackend::open(&path).await.unwrap();
        let restored = SessionStore::open(Arc::new(reopened)).await.unwrap();
        assert_eq!(restored.len().await, 1);
        assert!(restored.get("looked-at").await.is_none());
        assert_eq!(restored.get_history("kept").await.len(), 1);
    }

    #[tokio::test]
    async fn test_clear_is_idempotent() {
        let store = SessionStore::new();
        store.append("s1", ChatMessage::user("hello")).await.unwrap();

        store.clear("s1").await.unwrap();
        store.clear("s1").await.unwrap();
        store.clear("unknown").await.unwrap();

        assert!(store.get_history("s1").await.is_empty());
        let summaries = store.list_sessions().await;
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].message_count, 0);
        assert!(summaries[0].last_message_preview.is_none());
    }

    #[tokio::test]
    async fn test_list_sessions_counts() {
        let store = SessionStore::new();
        store.append("a", ChatMessage::user("q")).await.unwrap();
        store.append("a", ChatMessage::assistant("r")).await.unwrap();
        store.append("b", ChatMessage::user("q")).await.unwrap();

        let summaries = store.list_sessions().await;
        let a = summaries.iter().find(|s| s.session_id == "a").unwrap();
        let b = summaries.iter().find(|s| s.session_id == "b").unwrap();
        assert_eq!(a.message_count, 2);
        assert_eq!(b.message_count, 1);
        assert_eq!(a.last_message_preview.as_deref(), Some("r"));
    }

    #[tokio::test]
    async fn test_clear_all_resets_everything() {
        let store = SessionStore::new();
        store.append("a", ChatMessage::user("q")).await.unwrap();
        store.append("b", ChatMessage::user("q")).await.unwrap();

        store.clear_all().await.unwrap();

        assert!(store.get_history("a").await.is_empty());
        assert!(store.get_history("b").await.is_empty());
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_storage_failure_leaves_state_unchanged() {
        let store = SessionStore::with_backend(Arc::new(FailingBackend));

        let result = store.append("s1", ChatMessage::user("hello")).await;

        assert!(matches!(result, Err(StorageError::Unavailable(_))));
        assert!(store.get_history("s1").await.is_empty());
    }

    #[tokio::test]
    async fn test_open_restores_backend_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");

        let backend = Arc::new(
            crate::session::JsonFileBackend::open(&path).await.unwrap(),
        );
        let store = SessionStore::open(backend).await.unwrap();
        store.append("s1", ChatMessage::user("remember me")).await.unwrap();
        drop(store);

        let backend = Arc::new(
            crate::session::JsonFileBackend::open(&path).await.unwrap(),
        );
        let reopened = SessionStore::open(backend).await.unwrap();
        let history = reopened.get_history("s1").await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[0].content, "remember me");
    }

    #[test]
    fn test_preview_truncates_long_content() {
        let long = "x".repeat(150);
        let p = preview(&long);
        assert_eq!(p.len(), PREVIEW_CHARS + 3);
        assert!(p.ends_with("..."));
        assert_eq!(preview("short"), "short");
    }
}
