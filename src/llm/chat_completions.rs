//! OpenAI Chat Completions API driver.
//!
//! This module implements the [`LlmDriver`] trait for the OpenAI Chat Completions
//! API (`/v1/chat/completions`) and any provider that mirrors it, streaming
//! responses as server-sent events.

use futures::StreamExt;

use crate::normalized::NormalizedEvent;

use super::{EventStream, LlmDriver, LlmRequest, LlmSettings};

/// Driver for the OpenAI Chat Completions API.
///
/// Connects to the provider's chat completions endpoint and streams responses
/// as [`NormalizedEvent`]s.
#[derive(Clone)]
pub struct ChatCompletionsDriver {
    http: reqwest::Client,
    settings: LlmSettings,
}

impl std::fmt::Debug for ChatCompletionsDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatCompletionsDriver")
            .field("settings", &self.settings)
            .finish()
    }
}

impl ChatCompletionsDriver {
    /// Create a new Chat Completions driver with the given settings.
    #[must_use]
    pub fn new(settings: LlmSettings) -> Self {
        let http = reqwest::Client::builder()
            .connect_timeout(settings.timeout)
            .build()
            .unwrap_or_default();
        Self { http, settings }
    }

    fn request_body(&self, req: &LlmRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.settings.model,
            "stream": true,
            "messages": req.messages,
        });
        if let Some(t) = self.settings.temperature {
            body["temperature"] = serde_json::json!(t);
        }
        body
    }
}

#[async_trait::async_trait]
impl LlmDriver for ChatCompletionsDriver {
    async fn stream(&self, req: LlmRequest) -> anyhow::Result<EventStream> {
        let url = self.settings.provider.build_chat_url(&self.settings.base_url);
        let body = self.request_body(&req);

        let mut rb = self.http.post(&url).json(&body);
        if let Some(k) = &self.settings.api_key {
            rb = if self.settings.provider.uses_api_key_header() {
                rb.header("api-key", k)
            } else {
                rb.bearer_auth(k)
            };
        }

        let resp = rb.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            anyhow::bail!("provider returned {status}: {}", truncate(&detail, 300));
        }
        let byte_stream = resp.bytes_stream();
        let request_id = req.request_id;

        let out = async_stream::try_stream! {
            yield NormalizedEvent::StreamStart { request_id };

            let mut buf = Vec::<u8>::new();

            futures::pin_mut!(byte_stream);
            while let Some(chunk) = byte_stream.next().await {
                let chunk = chunk?;
                // CRLF framing: drop the CRs so frames always end in "\n\n".
                buf.extend(chunk.iter().copied().filter(|&b| b != b'\r'));

                while let Some(pos) = find_double_newline(&buf) {
                    let frame = buf.drain(..pos + 2).collect::<Vec<_>>();
                    for event in frame_events(&frame)? {
                        yield event;
                    }
                }
            }

            // A last frame without its trailing blank line.
            for event in frame_events(&buf)? {
                yield event;
            }
        };

        Ok(Box::pin(out))
    }
}

/// Translate one SSE `data:` payload into a normalized event.
///
/// Returns `Ok(None)` for payloads that carry nothing of interest (role-only
/// deltas, empty content, finish markers).
pub fn parse_data(data: &str) -> anyhow::Result<Option<NormalizedEvent>> {
    if data == "[DONE]" {
        return Ok(Some(NormalizedEvent::Done));
    }

    let v: serde_json::Value = serde_json::from_str(data)?;

    if let Some(err) = v.get("error") {
        let message = err
            .get("message")
            .and_then(|m| m.as_str())
            .map_or_else(|| err.to_string(), ToString::to_string);
        return Ok(Some(NormalizedEvent::Error { message }));
    }

    let text = v["choices"][0]["delta"]
        .get("content")
        .and_then(|x| x.as_str())
        .filter(|s| !s.is_empty());

    Ok(text.map(|s| NormalizedEvent::MessageDelta {
        text: s.to_string(),
    }))
}

/// Parse every `data:` line of one SSE frame.
fn frame_events(frame: &[u8]) -> anyhow::Result<Vec<NormalizedEvent>> {
    let text = String::from_utf8_lossy(frame);
    let mut events = Vec::new();
    for line in text.lines() {
        let Some(data) = line.trim().strip_prefix("data:") else {
            continue;
        };
        if let Some(event) = parse_data(data.trim())? {
            events.push(event);
        }
    }
    Ok(events)
}

/// Find the position of a double newline in the buffer.
fn find_double_newline(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\n\n")
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
