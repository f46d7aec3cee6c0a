//! HTTP client for interacting with the server.

use std::sync::{Arc, PoisonError, RwLock};

use url::Url;

use crate::{
    controller::ConversationBackend,
    error::{Error, Result},
    types::{ChatRequest, ChatResponse, Confirmation, Health, Message, SessionList},
};

/// HTTP client for the API.
///
/// Clones share the same credential, so signing out through one clone signs
/// out all of them.
///
/// # Example
///
/// ```rust,no_run
/// use medchat_sdk::Client;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = Client::new("http://localhost:8000")?.with_credential("eyJhbGciOi...");
///
/// let reply = client.chat().send("patient-42", "What is fever?").await?;
/// println!("{}", reply.response);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Client {
    base_url: Url,
    http: reqwest::Client,
    credential: Arc<RwLock<Option<String>>>,
}

impl Client {
    /// Create a new client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - The base URL of the server (e.g., "http://localhost:8000")
    pub fn new(base_url: impl AsRef<str>) -> Result<Self> {
        Self::with_client(base_url, reqwest::Client::new())
    }

    /// Create a new client with a custom reqwest client.
    pub fn with_client(base_url: impl AsRef<str>, http: reqwest::Client) -> Result<Self> {
        let base_url = Url::parse(base_url.as_ref())?;
        Ok(Self {
            base_url,
            http,
            credential: Arc::default(),
        })
    }

    /// Attach a bearer credential.
    #[must_use]
    pub fn with_credential(self, token: impl Into<String>) -> Self {
        self.set_credential(token);
        self
    }

    /// Replace the bearer credential.
    pub fn set_credential(&self, token: impl Into<String>) {
        *self
            .credential
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(token.into());
    }

    /// Forget the bearer credential.
    pub fn clear_credential(&self) {
        *self
            .credential
            .write()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Whether a credential is currently held.
    pub fn has_credential(&self) -> bool {
        self.credential
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    // ─────────────────────────────────────────────────────────────────────────
    // API Accessors
    // ─────────────────────────────────────────────────────────────────────────

    /// Access the Chat API.
    pub fn chat(&self) -> ChatApi<'_> {
        ChatApi { client: self }
    }

    /// Check server liveness and AI service availability.
    pub async fn health(&self) -> Result<Health> {
        let response = self.http.get(self.url(&["health"])?).send().await?;
        Self::handle_response(response).await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Internal helpers
    // ─────────────────────────────────────────────────────────────────────────

    /// Join percent-encoded path segments onto the base URL.
    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| Error::InvalidUrl(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let credential = self
            .credential
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match credential {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn handle_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T> {
        let status = response.status();
        if status.is_success() {
            Ok(response.json().await?)
        } else {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".into());
            Err(Error::from_status(status.as_u16(), &body))
        }
    }
}

// =============================================================================
// Chat API
// =============================================================================

/// Chat API client.
#[derive(Debug)]
pub struct ChatApi<'a> {
    client: &'a Client,
}

impl ChatApi<'_> {
    /// Send a message and wait for the assistant reply.
    pub async fn send(
        &self,
        session_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Result<ChatResponse> {
        let req = ChatRequest {
            session_id: session_id.into(),
            message: message.into(),
        };
        let response = self
            .client
            .authorized(self.client.http.post(self.client.url(&["api", "chat"])?))
            .json(&req)
            .send()
            .await?;
        Client::handle_response(response).await
    }

    /// Get messages for a session.
    pub async fn history(&self, session_id: &str) -> Result<Vec<Message>> {
        let url = self.client.url(&["api", "sessions", session_id, "messages"])?;
        let response = self
            .client
            .authorized(self.client.http.get(url))
            .send()
            .await?;
        Client::handle_response(response).await
    }

    /// List all sessions.
    pub async fn sessions(&self) -> Result<SessionList> {
        let url = self.client.url(&["api", "sessions"])?;
        let response = self
            .client
            .authorized(self.client.http.get(url))
            .send()
            .await?;
        Client::handle_response(response).await
    }

    /// Clear one session's history.
    pub async fn clear(&self, session_id: &str) -> Result<Confirmation> {
        let url = self.client.url(&["api", "sessions", session_id])?;
        let response = self
            .client
            .authorized(self.client.http.delete(url))
            .send()
            .await?;
        Client::handle_response(response).await
    }

    /// Clear every session's history.
    pub async fn clear_all(&self) -> Result<Confirmation> {
        let url = self.client.url(&["api", "sessions"])?;
        let response = self
            .client
            .authorized(self.client.http.delete(url))
            .send()
            .await?;
        Client::handle_response(response).await
    }
}

#[async_trait::async_trait]
impl ConversationBackend for Client {
    async fn send(&self, session_id: &str, message: &str) -> Result<ChatResponse> {
        self.chat().send(session_id, message).await
    }

    async fn history(&self, session_id: &str) -> Result<Vec<Message>> {
        self.chat().history(session_id).await
    }

    async fn sessions(&self) -> Result<SessionList> {
        self.chat().sessions().await
    }

    async fn clear(&self, session_id: &str) -> Result<()> {
        self.chat().clear(session_id).await.map(|_| ())
    }

    fn purge_credentials(&self) {
        self.clear_credential();
    }
}
