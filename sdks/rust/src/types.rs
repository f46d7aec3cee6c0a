//! Shared types for the SDK.
//!
//! These types mirror the server's API DTOs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Chat API Types
// =============================================================================

/// Author of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A message in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// The role of the message sender.
    pub role: Role,
    /// The message content.
    pub content: String,
    /// Server-assigned for persisted messages, local clock otherwise.
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// A message stamped with the local clock.
    #[must_use]
    pub fn local(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Request to send a message to a session.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    /// Session to append to.
    pub session_id: String,
    /// The user's message.
    pub message: String,
}

/// Response from a successful send.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    /// The assistant reply.
    pub response: String,
    /// Full session history after the exchange.
    pub history: Vec<Message>,
}

// =============================================================================
// Session API Types
// =============================================================================

/// Summary of one session as listed by the server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub message_count: usize,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
    #[serde(default)]
    pub last_message_preview: Option<String>,
}

/// All sessions known to the server.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionList {
    pub total_sessions: usize,
    pub sessions: Vec<SessionSummary>,
}

/// Acknowledgement returned by the clear endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct Confirmation {
    pub message: String,
}

/// Health check response.
#[derive(Debug, Clone, Deserialize)]
pub struct Health {
    pub status: String,
    pub ai_service: String,
    pub timestamp: DateTime<Utc>,
}

// =============================================================================
// Error Types
// =============================================================================

/// Error envelope used by every failing endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorDetail {
    pub kind: String,
    pub message: String,
}
