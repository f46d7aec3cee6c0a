//! Persisted chat turns.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Author of a chat turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Typed by the person chatting.
    User,
    /// Produced by the completion provider.
    Assistant,
}

impl Role {
    /// Wire name, as serialized in history entries.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single turn in a session.
///
/// Immutable once appended. The timestamp records when the server created the
/// turn; ordering inside a session is defined by append position, not time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    /// Create a user turn stamped with the current time.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::now(Role::User, content)
    }

    /// Create an assistant turn stamped with the current time.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::now(Role::Assistant, content)
    }

    fn now(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_shape() {
        let msg = ChatMessage::user("What is fever?");
        let value = serde_json::to_value(&msg).unwrap();

        assert_eq!(value["role"], "user");
        assert_eq!(value["content"], "What is fever?");
        let ts = value["timestamp"].as_str().unwrap();
        assert!(DateTime::parse_from_rfc3339(ts).is_ok());
    }

    #[test]
    fn test_rejects_unknown_role() {
        let raw = r#"{"role":"system","content":"x","timestamp":"2024-01-01T00:00:00Z"}"#;
        assert!(serde_json::from_str::<ChatMessage>(raw).is_err());
    }
}
