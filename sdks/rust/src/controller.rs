//! Client-side conversation state machine.
//!
//! A [`Controller`] drives one session for a UI. It keeps two snapshots of
//! the conversation:
//!
//! - **authoritative**: the last history the server returned
//! - **optimistic**: local-only messages not yet confirmed by the server
//!
//! [`Controller::messages`] merges them for display. A successful send
//! replaces the authoritative snapshot and drops the optimistic one.
//!
//! ```text
//!            send (non-empty)             success
//!   Idle ────────────────────▶ Sending ─────────────▶ Idle
//!    ▲                            │
//!    │ dismiss_error / send       │ failure
//!    └──────────────────── ErrorDisplayed ◀┘
//! ```

use crate::error::{Error, Result};
use crate::types::{ChatResponse, Message, Role, SessionList, SessionSummary};

/// Assistant text shown locally when a send fails. Never sent to the server.
pub const APOLOGY_TEXT: &str =
    "I'm sorry, I'm having trouble responding right now. Please try again in a moment.";

/// Server operations the controller needs.
#[async_trait::async_trait]
pub trait ConversationBackend: Send + Sync {
    async fn send(&self, session_id: &str, message: &str) -> Result<ChatResponse>;
    async fn history(&self, session_id: &str) -> Result<Vec<Message>>;
    async fn sessions(&self) -> Result<SessionList>;
    async fn clear(&self, session_id: &str) -> Result<()>;
    /// Forget any stored credential.
    fn purge_credentials(&self);
}

/// Where the controller is in the send cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Sending,
    ErrorDisplayed,
}

/// Result of [`Controller::send`] or [`Controller::complete_send`].
#[derive(Debug)]
pub enum SendOutcome {
    /// The server recorded both turns.
    Sent,
    /// Empty input or a send already in flight; nothing happened.
    Ignored,
    /// The send failed; a placeholder reply is displayed.
    Failed(Error),
    /// The credential was rejected and has been purged.
    Unauthenticated,
}

/// Result of [`Controller::mount`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountOutcome {
    Ready,
    Unauthenticated,
}

/// Result of [`Controller::clear`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearOutcome {
    Cleared,
    /// The confirmation callback declined.
    Cancelled,
    Unauthenticated,
}

/// Conversation state for a single session.
#[derive(Debug)]
pub struct Controller<B> {
    backend: B,
    session_id: String,
    identity: Option<String>,
    phase: Phase,
    authoritative: Vec<Message>,
    optimistic: Vec<Message>,
    summary: Option<SessionSummary>,
    last_error: Option<String>,
    authenticated: bool,
}

impl<B: ConversationBackend> Controller<B> {
    pub fn new(backend: B, session_id: impl Into<String>) -> Self {
        Self {
            backend,
            session_id: session_id.into(),
            identity: None,
            phase: Phase::Idle,
            authoritative: Vec::new(),
            optimistic: Vec::new(),
            summary: None,
            last_error: None,
            authenticated: true,
        }
    }

    /// Cache the signed-in user's display identity.
    #[must_use]
    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = Some(identity.into());
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// False once an auth failure has purged the credential.
    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    pub fn summary(&self) -> Option<&SessionSummary> {
        self.summary.as_ref()
    }

    /// Message of the failure currently displayed, if any.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Authoritative history followed by optimistic entries.
    pub fn messages(&self) -> Vec<Message> {
        self.authoritative
            .iter()
            .chain(&self.optimistic)
            .cloned()
            .collect()
    }

    /// Load history and the session summary from the server.
    pub async fn mount(&mut self) -> Result<MountOutcome> {
        let loaded = async {
            let history = self.backend.history(&self.session_id).await?;
            let list = self.backend.sessions().await?;
            Ok::<_, Error>((history, list))
        }
        .await;

        match loaded {
            Ok((history, list)) => {
                self.summary = list
                    .sessions
                    .into_iter()
                    .find(|s| s.session_id == self.session_id);
                self.authoritative = history;
                self.optimistic.clear();
                self.authenticated = true;
                Ok(MountOutcome::Ready)
            }
            Err(e) if e.is_auth() => {
                self.purge();
                Ok(MountOutcome::Unauthenticated)
            }
            Err(e) => Err(e),
        }
    }

    /// Start a send: validate, append the optimistic user message and enter
    /// [`Phase::Sending`]. Returns the text to send, or `None` if nothing
    /// should be sent.
    pub fn begin_send(&mut self, input: &str) -> Option<String> {
        let text = input.trim();
        if text.is_empty() || self.phase == Phase::Sending {
            return None;
        }

        self.last_error = None;
        self.optimistic.push(Message::local(Role::User, text));
        self.phase = Phase::Sending;
        Some(text.to_string())
    }

    /// Finish a send started with [`Controller::begin_send`].
    pub fn complete_send(&mut self, result: Result<ChatResponse>) -> SendOutcome {
        match result {
            Ok(reply) => {
                self.authoritative = reply.history;
                self.optimistic.clear();
                self.phase = Phase::Idle;
                SendOutcome::Sent
            }
            Err(e) if e.is_auth() => {
                self.purge();
                SendOutcome::Unauthenticated
            }
            Err(e) => {
                self.optimistic
                    .push(Message::local(Role::Assistant, APOLOGY_TEXT));
                self.last_error = Some(e.to_string());
                self.phase = Phase::ErrorDisplayed;
                SendOutcome::Failed(e)
            }
        }
    }

    /// Send `input` and wait for the reply.
    pub async fn send(&mut self, input: &str) -> SendOutcome {
        let Some(text) = self.begin_send(input) else {
            return SendOutcome::Ignored;
        };
        let result = self.backend.send(&self.session_id, &text).await;
        self.complete_send(result)
    }

    /// Return to [`Phase::Idle`] after a failure. The failed exchange stays
    /// visible until the next successful send or mount.
    pub fn dismiss_error(&mut self) {
        if self.phase == Phase::ErrorDisplayed {
            self.phase = Phase::Idle;
            self.last_error = None;
        }
    }

    /// Clear the session after `confirm` agrees.
    ///
    /// Local state is emptied only once the server has cleared; on failure it
    /// is left untouched and the error is returned.
    pub async fn clear<F>(&mut self, confirm: F) -> Result<ClearOutcome>
    where
        F: FnOnce() -> bool,
    {
        if !confirm() {
            return Ok(ClearOutcome::Cancelled);
        }

        match self.backend.clear(&self.session_id).await {
            Ok(()) => {
                self.authoritative.clear();
                self.optimistic.clear();
                if let Some(summary) = &mut self.summary {
                    summary.message_count = 0;
                    summary.last_message_preview = None;
                }
                self.last_error = None;
                self.phase = Phase::Idle;
                Ok(ClearOutcome::Cleared)
            }
            Err(e) if e.is_auth() => {
                self.purge();
                Ok(ClearOutcome::Unauthenticated)
            }
            Err(e) => Err(e),
        }
    }

    fn purge(&mut self) {
        self.backend.purge_credentials();
        self.identity = None;
        self.authenticated = false;
        self.authoritative.clear();
        self.optimistic.clear();
        self.summary = None;
        self.last_error = None;
        self.phase = Phase::Idle;
    }
}
