//! Normalized event types for streaming LLM responses.
//!
//! Drivers translate provider-specific wire formats into [`NormalizedEvent`]s
//! so the orchestrator can assemble a completion without knowing which API
//! produced it.
//!
//! # Example
//!
//! ```rust
//! use medchat::normalized::NormalizedEvent;
//!
//! let event = NormalizedEvent::MessageDelta {
//!     text: "Hello".to_string(),
//! };
//! let json = serde_json::to_string(&event).unwrap();
//! assert!(json.contains("message.delta"));
//! ```

use serde::{Deserialize, Serialize};

/// Normalized streaming events emitted by LLM drivers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "data")]
pub enum NormalizedEvent {
    /// Indicates the start of a new streaming response.
    #[serde(rename = "stream.start")]
    StreamStart {
        /// Unique identifier for this request/response pair.
        request_id: String,
    },

    /// Incremental text delta from the assistant's response.
    #[serde(rename = "message.delta")]
    MessageDelta {
        /// The text fragment to append.
        text: String,
    },

    /// The provider reported an error mid-stream.
    #[serde(rename = "error")]
    Error {
        /// Provider-supplied description.
        message: String,
    },

    /// The provider finished the response.
    #[serde(rename = "done")]
    Done,
}
