//! Session and conversation thread management.
//!
//! This module owns the canonical, ordered chat history of every session.
//! Sessions are identified by an opaque client-provided string and hold the
//! full message history in append order.
//!
//! # Architecture
//!
//! - [`ChatMessage`]: One immutable turn (user or assistant)
//! - [`Session`]: Represents a single conversation session
//! - [`SessionStore`]: Thread-safe store for all known sessions
//! - [`SessionBackend`]: Durable storage behind the store
//!
//! # Example
//!
//! ```rust
//! use medchat::session::{ChatMessage, SessionStore};
//!
//! # async fn demo() {
//! let store = SessionStore::new();
//! store.append("s1", ChatMessage::user("Hello!")).await.unwrap();
//!
//! let messages = store.get_history("s1").await;
//! assert_eq!(messages.len(), 1);
//! # }
//! ```

mod message;
mod storage;
mod thread;

pub use message::{ChatMessage, Role};
pub use storage::{JsonFileBackend, MemoryBackend, SessionBackend};
pub use thread::{Session, SessionStore, SessionSummary};
