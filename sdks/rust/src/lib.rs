//! Rust SDK for medchat
//!
//! - [`Client`]: typed HTTP client for the chat API (feature `http-client`, on
//!   by default)
//! - [`controller::Controller`]: UI-side conversation state machine with
//!   optimistic updates, usable with any [`controller::ConversationBackend`]
//! - [`format`]: safe rendering of formatting markers in assistant replies
//!
//! ```rust,no_run
//! use medchat_sdk::Client;
//! use medchat_sdk::controller::{Controller, SendOutcome};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::new("http://localhost:8000")?;
//!     let mut chat = Controller::new(client, "patient-42");
//!
//!     chat.mount().await?;
//!     if let SendOutcome::Failed(e) = chat.send("What is fever?").await {
//!         eprintln!("send failed: {e}");
//!     }
//!     for message in chat.messages() {
//!         println!("{:?}: {}", message.role, message.content);
//!     }
//!     Ok(())
//! }
//! ```

pub mod controller;
pub mod error;
pub mod format;
pub mod types;

#[cfg(feature = "http-client")]
pub mod client;

// Re-exports
pub use error::Error;
pub use types::*;

#[cfg(feature = "http-client")]
pub use client::Client;
