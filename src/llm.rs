//! Language model capability and the OpenAI-compatible client behind it.
//!
//! The router only sees [`ChatModel`]: send messages, get text back, and
//! optionally receive tokens as they arrive.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config::LlmConfig;
use crate::error::ChatError;

/// Backoff before the single retry of a failed model call.
pub const RETRY_BACKOFF: Duration = Duration::from_millis(500);

const PROBE_TIMEOUT: Duration = Duration::from_secs(3);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

// ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    // ---
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Receiver for streamed reply fragments.
pub type TokenSink<'a> = dyn for<'t> FnMut(&'t str) + Send + 'a;

/// "Send messages, receive text, optionally stream tokens."
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Return the whole reply at once.
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ChatError>;

    /// Deliver the reply incrementally through `on_token` and return the full
    /// text. Models without token streaming emit the whole reply once.
    async fn stream(
        &self,
        messages: &[ChatMessage],
        on_token: &mut TokenSink<'_>,
    ) -> Result<String, ChatError> {
        // ---
        let text = self.complete(messages).await?;
        on_token(&text);
        Ok(text)
    }
}

// --- OpenAI-compatible client

#[derive(Debug, Deserialize)]
struct Completion {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelList {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
}

/// Client for `/chat/completions` and `/models` on an OpenAI-style server
/// (vLLM, llama.cpp, Ollama, LM Studio, ...).
pub struct OpenAiClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAiClient {
    // ---
    pub fn new(cfg: &LlmConfig) -> Result<Self, ChatError> {
        // ---
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;

        Ok(Self {
            http,
            base_url: cfg.base_url.clone(),
            model: cfg.model.clone(),
            api_key: cfg.api_key.clone(),
            temperature: cfg.temperature,
            max_tokens: cfg.max_tokens,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Check that the endpoint answers `GET /models`, switching to the
    /// `/openai/v1` base when only that one responds. The whole probe is
    /// retried once after [`RETRY_BACKOFF`]. Returns the advertised model ids.
    pub async fn preflight(&mut self) -> Result<Vec<String>, ChatError> {
        // ---
        let models = match self.probe().await {
            Ok(models) => models,
            Err(e) => {
                tracing::warn!("Model endpoint probe failed ({e}), retrying");
                tokio::time::sleep(RETRY_BACKOFF).await;
                self.probe().await?
            }
        };

        tracing::info!("Models on server: {:?}", models);
        if !models.iter().any(|m| m == &self.model) {
            tracing::warn!(
                "Configured model '{}' not advertised by {}",
                self.model,
                self.base_url
            );
        }
        Ok(models)
    }

    async fn probe(&mut self) -> Result<Vec<String>, ChatError> {
        // ---
        match self.list_models(&self.base_url).await {
            Ok(models) => return Ok(models),
            Err(e) => tracing::debug!("GET {}/models failed: {e}", self.base_url),
        }

        let alt = alternate_base_url(&self.base_url);
        let models = self.list_models(&alt).await?;
        tracing::info!("Switched model base URL to {}", alt);
        self.base_url = alt;
        Ok(models)
    }

    async fn list_models(&self, base_url: &str) -> Result<Vec<String>, ChatError> {
        // ---
        let resp = self
            .http
            .get(format!("{base_url}/models"))
            .bearer_auth(&self.api_key)
            .timeout(PROBE_TIMEOUT)
            .send()
            .await?;
        let list: ModelList = check_status(resp).await?.json().await?;
        Ok(list.data.into_iter().map(|m| m.id).collect())
    }

    fn request_body(&self, messages: &[ChatMessage], stream: bool) -> Value {
        json!({
            "model": self.model,
            "messages": messages,
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
            "stream": stream,
        })
    }

    async fn post_completion(&self, body: &Value) -> Result<reqwest::Response, ChatError> {
        // ---
        let resp = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;
        check_status(resp).await
    }
}

#[async_trait]
impl ChatModel for OpenAiClient {
    // ---
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ChatError> {
        // ---
        let resp = self
            .post_completion(&self.request_body(messages, false))
            .await?;
        let completion: Completion = resp.json().await?;
        let choice = completion
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ChatError::Malformed("no choices in completion".into()))?;
        Ok(choice.message.content.unwrap_or_default())
    }

    async fn stream(
        &self,
        messages: &[ChatMessage],
        on_token: &mut TokenSink<'_>,
    ) -> Result<String, ChatError> {
        // ---
        let resp = self.post_completion(&self.request_body(messages, true)).await?;
        let mut body = resp.bytes_stream();
        let mut pending: Vec<u8> = Vec::new();
        let mut text = String::new();

        'read: while let Some(chunk) = body.next().await {
            pending.extend_from_slice(&chunk?);
            while let Some(pos) = pending.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = pending.drain(..=pos).collect();
                match parse_sse_line(&String::from_utf8_lossy(&line))? {
                    SseEvent::Token(token) => {
                        on_token(&token);
                        text.push_str(&token);
                    }
                    SseEvent::Done => break 'read,
                    SseEvent::Skip => {}
                }
            }
        }
        Ok(text)
    }
}

async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, ChatError> {
    // ---
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    let body: String = body.chars().take(300).collect();
    Err(ChatError::Status {
        status: status.as_u16(),
        body,
    })
}

/// `http://host/v1` → `http://host/openai/v1`.
pub fn alternate_base_url(base_url: &str) -> String {
    // ---
    let base = base_url.trim_end_matches('/');
    match base.strip_suffix("/v1") {
        Some(root) => format!("{root}/openai/v1"),
        None => format!("{base}/openai/v1"),
    }
}

#[derive(Debug, PartialEq, Eq)]
enum SseEvent {
    Token(String),
    Done,
    Skip,
}

/// Interpret one line of a streamed completion.
fn parse_sse_line(line: &str) -> Result<SseEvent, ChatError> {
    // ---
    let Some(payload) = line.trim().strip_prefix("data:") else {
        return Ok(SseEvent::Skip);
    };
    let payload = payload.trim();
    if payload == "[DONE]" {
        return Ok(SseEvent::Done);
    }
    if payload.is_empty() {
        return Ok(SseEvent::Skip);
    }

    let chunk: Value = serde_json::from_str(payload)
        .map_err(|e| ChatError::Malformed(format!("bad stream chunk: {e}")))?;
    match chunk["choices"][0]["delta"]["content"].as_str() {
        Some(token) if !token.is_empty() => Ok(SseEvent::Token(token.to_string())),
        _ => Ok(SseEvent::Skip),
    }
}
