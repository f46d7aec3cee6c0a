//! Persistence backends for session history.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use super::ChatMessage;
use crate::error::StorageError;

/// Durable storage behind the [`SessionStore`](super::SessionStore).
///
/// The store keeps the working copy in memory and calls into the backend
/// before committing any change, so a backend failure leaves the in-memory
/// state untouched.
#[async_trait]
pub trait SessionBackend: Send + Sync + std::fmt::Debug {
    /// Load every persisted session.
    async fn load_all(&self) -> Result<HashMap<String, Vec<ChatMessage>>, StorageError>;

    /// Replace the persisted history of one session.
    async fn save(&self, session_id: &str, messages: &[ChatMessage]) -> Result<(), StorageError>;

    /// Reset every persisted session to an empty history.
    async fn clear_all(&self) -> Result<(), StorageError>;
}

/// Backend that persists nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct MemoryBackend;

#[async_trait]
impl SessionBackend for MemoryBackend {
    async fn load_all(&self) -> Result<HashMap<String, Vec<ChatMessage>>, StorageError> {
        Ok(HashMap::new())
    }

    async fn save(&self, _session_id: &str, _messages: &[ChatMessage]) -> Result<(), StorageError> {
        Ok(())
    }

    async fn clear_all(&self) -> Result<(), StorageError> {
        Ok(())
    }
}

/// Backend that keeps all sessions in one JSON document.
///
/// The file holds an object keyed by session id whose values are message
/// arrays. Every write goes to a sibling temp file which is then renamed into
/// place.
#[derive(Debug)]
pub struct JsonFileBackend {
    path: PathBuf,
    snapshot: Mutex<BTreeMap<String, Vec<ChatMessage>>>,
}

impl JsonFileBackend {
    /// Open the history file at `path`, creating parent directories as needed.
    ///
    /// A missing file is treated as an empty history.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let snapshot = match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => BTreeMap::new(),
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path,
            snapshot: Mutex::new(snapshot),
        })
    }

    /// Location of the history file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn write(&self, snapshot: &BTreeMap<String, Vec<ChatMessage>>) -> Result<(), StorageError> {
        let bytes = serde_json::to_vec_pretty(snapshot)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!(path = %self.path.display(), sessions = snapshot.len(), "History file written");
        Ok(())
    }
}

#[async_trait]
impl SessionBackend for JsonFileBackend {
    async fn load_all(&self) -> Result<HashMap<String, Vec<ChatMessage>>, StorageError> {
        let guard = self.snapshot.lock().await;
        Ok(guard.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    }

    async fn save(&self, session_id: &str, messages: &[ChatMessage]) -> Result<(), StorageError> {
        let mut guard = self.snapshot.lock().await;
        let previous = guard.insert(session_id.to_string(), messages.to_vec());

        if let Err(e) = self.write(&guard).await {
            match previous {
                Some(old) => guard.insert(session_id.to_string(), old),
                None => guard.remove(session_id),
            };
            return Err(e);
        }
        Ok(())
    }

    async fn clear_all(&self) -> Result<(), StorageError> {
        let mut guard = self.snapshot.lock().await;
        let previous = guard.clone();
        for messages in guard.values_mut() {
            messages.clear();
        }

        if let Err(e) = self.write(&guard).await {
            *guard = previous;
            return Err(e);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let backend = JsonFileBackend::open(dir.path().join("history.json"))
            .await
            .unwrap();

        assert!(backend.load_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("history.json");

        let backend = JsonFileBackend::open(&path).await.unwrap();
        let messages = vec![
            ChatMessage::user("What is fever?"),
            ChatMessage::assistant("Fever is elevated body temperature."),
        ];
        backend.save("s1", &messages).await.unwrap();
        drop(backend);

        let reopened = JsonFileBackend::open(&path).await.unwrap();
        let all = reopened.load_all().await.unwrap();
        assert_eq!(all.get("s1"), Some(&messages));
    }

    #[tokio::test]
    async fn test_clear_all_keeps_ids() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        let backend = JsonFileBackend::open(&path).await.unwrap();
        backend
            .save("a", &[ChatMessage::user("hi")])
            .await
            .unwrap();

        backend.clear_all().await.unwrap();

        let all = JsonFileBackend::open(&path).await.unwrap().load_all().await.unwrap();
        assert_eq!(all.get("a").map(Vec::len), Some(0));
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        tokio::fs::write(&path, b"{not json").await.unwrap();

        let err = JsonFileBackend::open(&path).await.unwrap_err();
        assert!(matches!(err, StorageError::Encoding(_)));
    }

    #[tokio::test]
    async fn test_failed_write_rolls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        let backend = JsonFileBackend::open(&path).await.unwrap();

        // A directory where the temp file should go makes the write fail.
        tokio::fs::create_dir(path.with_extension("json.tmp"))
            .await
            .unwrap();

        let result = backend.save("s1", &[ChatMessage::user("hi")]).await;
        assert!(matches!(result, Err(StorageError::Io(_))));
        assert!(backend.load_all().await.unwrap().is_empty());
    }
}
