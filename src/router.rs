//! Tool router: decides between a sensor query and plain chat.
//!
//! Parse and tool failures never escape this module; they come back as
//! annotated text inside a [`RoutedResponse`].

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::Config;
use crate::error::{ChatError, ToolError};
use crate::intent::{self, Directive, Intent, Syntax};
use crate::llm::{ChatMessage, ChatModel, TokenSink, RETRY_BACKOFF};
use crate::models::{ToolOutput, ToolRequest};
use crate::present;
use crate::prompts;
use crate::query::SensorQueries;

// ---

/// Outcome of routing one input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutedResponse {
    /// Tool output as pretty JSON, or an annotated tool/parse error.
    ToolResult(String),
    /// The model's reply.
    ChatResult(String),
    /// The model could not be reached even after a retry.
    ChatFailure(String),
}

impl RoutedResponse {
    // ---
    pub fn text(&self) -> &str {
        match self {
            Self::ToolResult(t) | Self::ChatResult(t) | Self::ChatFailure(t) => t,
        }
    }

    pub fn into_text(self) -> String {
        match self {
            Self::ToolResult(t) | Self::ChatResult(t) | Self::ChatFailure(t) => t,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RouterSettings {
    pub tool_timeout: Duration,
    /// Ask the model for a JSON directive before treating input as chat.
    pub tool_directives: bool,
    pub summarize_tool_results: bool,
}

impl RouterSettings {
    pub fn from_config(cfg: &Config) -> Self {
        // ---
        let defaults = Self::default();
        Self {
            tool_timeout: cfg.tool_timeout,
            tool_directives: cfg
                .llm
                .as_ref()
                .map_or(defaults.tool_directives, |llm| llm.tool_directives),
            summarize_tool_results: cfg
                .llm
                .as_ref()
                .map_or(defaults.summarize_tool_results, |llm| llm.summarize_tool_results),
        }
    }
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            tool_timeout: Duration::from_secs(10),
            tool_directives: true,
            summarize_tool_results: false,
        }
    }
}

/// A tool invocation, whatever executes it underneath.
pub type ToolCall<'a, T> = BoxFuture<'a, Result<T, ToolError>>;

/// Await `call` for at most `timeout`; the call is dropped when time runs out.
pub async fn invoke_with_timeout<T>(timeout: Duration, call: ToolCall<'_, T>) -> Result<T, ToolError> {
    // ---
    tokio::time::timeout(timeout, call)
        .await
        .map_err(|_| ToolError::Timeout(timeout))?
}

pub struct ToolRouter {
    queries: Arc<SensorQueries>,
    chat: Arc<dyn ChatModel>,
    settings: RouterSettings,
}

impl ToolRouter {
    // ---
    pub fn new(queries: Arc<SensorQueries>, chat: Arc<dyn ChatModel>, settings: RouterSettings) -> Self {
        Self {
            queries,
            chat,
            settings,
        }
    }

    pub fn queries(&self) -> &SensorQueries {
        &self.queries
    }

    pub fn settings(&self) -> &RouterSettings {
        &self.settings
    }

    /// Run a tool request under the configured timeout.
    pub async fn invoke(&self, request: &ToolRequest) -> Result<ToolOutput, ToolError> {
        // ---
        let call: ToolCall<'_, ToolOutput> = Box::pin(self.queries.run(request));
        invoke_with_timeout(self.settings.tool_timeout, call).await
    }

    /// Route one input and return the complete response.
    pub async fn route(&self, input: &str) -> RoutedResponse {
        self.route_streaming(input, &mut |_: &str| {}).await
    }

    /// Route one input. Chat text is also delivered through `on_token`, token
    /// by token when the model streams; tool output and failures are not.
    pub async fn route_streaming(
        &self,
        input: &str,
        on_token: &mut TokenSink<'_>,
    ) -> RoutedResponse {
        // ---
        let request_id = Uuid::new_v4();
        let span = tracing::info_span!("route", %request_id);
        self.dispatch(input.trim(), on_token).instrument(span).await
    }

    async fn dispatch(&self, input: &str, on_token: &mut TokenSink<'_>) -> RoutedResponse {
        // ---
        match intent::classify(input) {
            Some(Intent::Tool(request)) => return self.run_tool(&request).await,
            Some(Intent::Invalid { syntax, error }) => {
                tracing::info!(?syntax, %error, "rejected input");
                return RoutedResponse::ToolResult(present::parse_failure(syntax, &error));
            }
            None => {}
        }

        if self.settings.tool_directives {
            self.route_with_directive(input, on_token).await
        } else {
            tracing::debug!("no intent matched, forwarding to chat");
            match self.stream_with_retry(&prompts::chat_messages(input), on_token).await {
                Ok(text) => RoutedResponse::ChatResult(text),
                Err(e) => RoutedResponse::ChatFailure(present::chat_error(&e)),
            }
        }
    }

    async fn run_tool(&self, request: &ToolRequest) -> RoutedResponse {
        // ---
        let label = request.label();
        tracing::info!(tool = %label, "invoking tool");
        match self.invoke(request).await {
            Ok(output) => RoutedResponse::ToolResult(present::tool_text(&output)),
            Err(e) => {
                tracing::warn!(tool = %label, "tool failed: {e}");
                RoutedResponse::ToolResult(present::tool_error(&label, &e))
            }
        }
    }

    async fn route_with_directive(
        &self,
        input: &str,
        on_token: &mut TokenSink<'_>,
    ) -> RoutedResponse {
        // ---
        let reply = match self.complete_with_retry(&prompts::directive_messages(input)).await {
            Ok(reply) => reply,
            Err(e) => return RoutedResponse::ChatFailure(present::chat_error(&e)),
        };

        let request = match intent::parse_directive(&reply) {
            Directive::None => {
                on_token(&reply);
                return RoutedResponse::ChatResult(reply);
            }
            Directive::Invalid(error) => {
                return RoutedResponse::ToolResult(present::parse_failure(Syntax::Directive, &error))
            }
            Directive::Call(request) => request,
        };

        let label = request.label();
        tracing::info!(tool = %label, "model requested tool");
        let output = match self.invoke(&request).await {
            Ok(output) => output,
            Err(e) => {
                tracing::warn!(tool = %label, "tool failed: {e}");
                return RoutedResponse::ToolResult(present::tool_error(&label, &e));
            }
        };

        let tool_json = present::tool_text(&output);
        if !self.settings.summarize_tool_results {
            return RoutedResponse::ToolResult(tool_json);
        }

        let messages = prompts::summary_messages(input, &reply, &tool_json);
        match self.complete_with_retry(&messages).await {
            Ok(summary) if !summary.trim().is_empty() => RoutedResponse::ToolResult(summary),
            Ok(_) => RoutedResponse::ToolResult(tool_json),
            Err(e) => {
                tracing::warn!("summary failed, returning raw tool output: {e}");
                RoutedResponse::ToolResult(tool_json)
            }
        }
    }

    async fn complete_with_retry(&self, messages: &[ChatMessage]) -> Result<String, ChatError> {
        // ---
        match self.chat.complete(messages).await {
            Ok(text) => Ok(text),
            Err(e) => {
                tracing::warn!("chat attempt failed ({e}), retrying");
                tokio::time::sleep(RETRY_BACKOFF).await;
                self.chat.complete(messages).await.inspect_err(|e| {
                    tracing::error!("chat failed: {e}");
                })
            }
        }
    }

    /// Retries only when nothing reached `on_token` yet.
    async fn stream_with_retry(
        &self,
        messages: &[ChatMessage],
        on_token: &mut TokenSink<'_>,
    ) -> Result<String, ChatError> {
        // ---
        let mut emitted = false;
        let first = {
            let mut tracked = |token: &str| {
                emitted = true;
                on_token(token);
            };
            self.chat.stream(messages, &mut tracked).await
        };

        match first {
            Ok(text) => Ok(text),
            Err(e) if emitted => {
                tracing::error!("chat stream broke off: {e}");
                Err(e)
            }
            Err(e) => {
                tracing::warn!("chat attempt failed ({e}), retrying");
                tokio::time::sleep(RETRY_BACKOFF).await;
                self.chat.stream(messages, on_token).await.inspect_err(|e| {
                    tracing::error!("chat failed: {e}");
                })
            }
        }
    }
}
