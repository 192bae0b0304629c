//! OpenAI-compatible chat completion provider (`/v1/chat/completions`).
//!
//! All OpenAI wire types are private to this module — callers only see
//! [`Generation`] and [`BackendFault`]. The model travels with each request
//! so one provider serves the whole catalog. With `stream` set the request
//! carries `"stream": true` and the reply is decoded from server-sent events.

use std::future;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use eventsource_stream::{Event, EventStreamError, Eventsource};
use futures_util::StreamExt;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, trace};

use crate::llm::{BackendFault, FaultKind, Generation, StoredAttachment};

const DONE_SENTINEL: &str = "[DONE]";

// ── Public provider ───────────────────────────────────────────────────────────

/// Adapter for any HTTP endpoint implementing `/v1/chat/completions`.
///
/// Covers OpenAI, OpenAI-compatible local servers (Ollama, LM Studio…),
/// and hosted aggregators. Constructed once at startup, then cheaply cloned
/// because `reqwest::Client` is an `Arc` internally.
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleProvider {
    client: Client,
    api_base_url: String,
    temperature: f32,
    timeout: Duration,
    system_prompt: Option<String>,
    stream: bool,
    api_key: Option<String>,
}

impl OpenAiCompatibleProvider {
    /// Build a provider from config values and an optional API key.
    ///
    /// `timeout_seconds` bounds connecting and, for whole replies, the full
    /// request. Streamed replies are not cut off once they start.
    pub fn new(
        api_base_url: String,
        temperature: f32,
        timeout_seconds: u64,
        system_prompt: Option<String>,
        stream: bool,
        api_key: Option<String>,
    ) -> Result<Self, BackendFault> {
        let timeout = Duration::from_secs(timeout_seconds);
        let client = Client::builder()
            .connect_timeout(timeout)
            .build()
            .map_err(|e| BackendFault::transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, api_base_url, temperature, timeout, system_prompt, stream, api_key })
    }

    /// Lightweight reachability probe.
    ///
    /// Any HTTP response (including 4xx) means the server is reachable. Only
    /// a transport-level failure counts as unreachable.
    pub async fn ping(&self) -> Result<(), BackendFault> {
        let mut req = self.client.head(&self.api_base_url).timeout(Duration::from_secs(5));
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        req.send()
            .await
            .map(|_| ())
            .map_err(|e| BackendFault::transport(format!("unreachable: {e}")))
    }

    /// One round-trip: optional system prompt plus the user prompt.
    pub async fn generate(
        &self,
        prompt: &str,
        model: &str,
        attachments: &[StoredAttachment],
    ) -> Result<Generation, BackendFault> {
        let payload = self.build_payload(prompt, model, attachments).await?;

        debug!(
            model = %payload.model,
            stream = self.stream,
            prompt_len = prompt.len(),
            attachments = attachments.len(),
            "sending LLM request"
        );
        if tracing::enabled!(tracing::Level::TRACE) {
            let json = serde_json::to_string(&payload)
                .unwrap_or_else(|e| format!("<serialization failed: {e}>"));
            trace!(payload_len = json.len(), "LLM request payload serialized");
        }

        let mut req = self.client.post(&self.api_base_url).json(&payload);
        if !self.stream {
            req = req.timeout(self.timeout);
        }
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let response = req.send().await.map_err(|e| {
            error!(url = %self.api_base_url, error = %e, timeout = e.is_timeout(), "LLM HTTP request failed (transport)");
            BackendFault::transport(e.to_string())
        })?;

        let response = check_status(response).await?;

        if self.stream {
            let fragments = response
                .bytes_stream()
                .eventsource()
                .take_while(|event| {
                    future::ready(!matches!(event, Ok(e) if e.data.trim() == DONE_SENTINEL))
                })
                .filter_map(|event| future::ready(decode_event(event)));
            return Ok(Generation::Stream(Box::pin(fragments)));
        }

        let parsed = response.json::<ChatCompletionResponse>().await.map_err(|e| {
            error!(error = %e, "failed to deserialize LLM response");
            BackendFault::transport(format!("failed to parse response body: {e}"))
        })?;

        debug!(choices = parsed.choices.len(), "received LLM response");

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .map(Generation::Whole)
            .ok_or_else(|| BackendFault::unavailable("empty or missing content in response"))
    }

    async fn build_payload(
        &self,
        prompt: &str,
        model: &str,
        attachments: &[StoredAttachment],
    ) -> Result<ChatCompletionRequest, BackendFault> {
        let mut messages = Vec::new();
        if let Some(sys) = &self.system_prompt {
            messages.push(Message { role: "system", content: MessageContent::Text(sys.clone()) });
        }

        let content = if attachments.is_empty() {
            MessageContent::Text(prompt.to_string())
        } else {
            let mut parts = vec![ContentPart::Text { text: prompt.to_string() }];
            for a in attachments {
                let bytes = tokio::fs::read(&a.path).await.map_err(|e| {
                    BackendFault::transport(format!("cannot read attachment '{}': {e}", a.filename))
                })?;
                parts.push(ContentPart::ImageUrl {
                    image_url: ImageUrl { url: format!("data:{};base64,{}", a.mime, BASE64.encode(bytes)) },
                });
            }
            MessageContent::Parts(parts)
        };
        messages.push(Message { role: "user", content });

        // Some models (gpt-5 family) do not accept a temperature parameter.
        let temperature = if model.starts_with("gpt-5") { None } else { Some(self.temperature) };

        Ok(ChatCompletionRequest {
            model: model.to_string(),
            messages,
            temperature,
            stream: self.stream.then_some(true),
        })
    }
}

// ── Private wire types ────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct Message {
    role: &'static str,
    content: MessageContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// One `data:` payload of a streamed reply.
#[derive(Debug, Deserialize)]
struct ChunkEnvelope {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    error: Option<ErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

// Error envelope used by OpenAI and compatible APIs.
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
    #[serde(default)]
    code: Option<serde_json::Value>,
}

/// Map one SSE event to a fragment. `None` skips keep-alives and role-only
/// deltas.
fn decode_event(
    event: Result<Event, EventStreamError<reqwest::Error>>,
) -> Option<Result<String, BackendFault>> {
    let event = match event {
        Ok(event) => event,
        Err(e) => {
            error!(error = %e, "SSE stream error");
            return Some(Err(BackendFault::transport(format!("stream error: {e}"))));
        }
    };
    decode_chunk(&event.data)
}

fn decode_chunk(data: &str) -> Option<Result<String, BackendFault>> {
    let data = data.trim();
    if data.is_empty() {
        return None;
    }
    trace!(data, "SSE chunk");

    let chunk: ChunkEnvelope = match serde_json::from_str(data) {
        Ok(chunk) => chunk,
        Err(e) => {
            return Some(Err(BackendFault::transport(format!("malformed stream chunk: {e}"))));
        }
    };

    if let Some(err) = chunk.error {
        return Some(Err(BackendFault::unavailable(err.message)));
    }

    chunk
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.delta.content)
        .filter(|s| !s.is_empty())
        .map(Ok)
}

/// Which fault kind an HTTP error status maps to.
fn classify_status(status: StatusCode, message: &str) -> FaultKind {
    let lower = message.to_lowercase();
    let mentions_model = lower.contains("model")
        && (lower.contains("not found")
            || lower.contains("does not exist")
            || lower.contains("invalid")
            || lower.contains("unknown")
            || lower.contains("not supported"));

    if status == StatusCode::NOT_FOUND || (status.is_client_error() && mentions_model) {
        FaultKind::InvalidModel
    } else {
        FaultKind::BackendUnavailable
    }
}

/// Consume the response and return it if successful, or a structured fault.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, BackendFault> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<failed to read error body>".to_string());

    let message = if let Ok(env) = serde_json::from_str::<ErrorEnvelope>(&body) {
        let code = env
            .error
            .code
            .map(|v| match v {
                serde_json::Value::String(s) => format!(" [code={s}]"),
                other => format!(" [code={other}]"),
            })
            .unwrap_or_default();
        format!("HTTP {status}{code}: {}", env.error.message)
    } else {
        format!("HTTP {status}: {body}")
    };

    error!(%status, %message, "LLM request returned HTTP error");
    Err(BackendFault::new(classify_status(status, &message), message))
}
