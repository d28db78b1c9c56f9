//! OpenAI-compatible client against a mock model server.

use std::net::SocketAddr;

use anyhow::Result;
use axum::{
    http::header::CONTENT_TYPE,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};

use live_data_agent::config::LlmConfig;
use live_data_agent::{ChatMessage, ChatModel, OpenAiClient};

async fn models() -> Json<Value> {
    Json(json!({ "data": [{ "id": "qwen2.5-7b" }] }))
}

async fn completions(Json(body): Json<Value>) -> Response {
    // ---
    if body["stream"] == json!(true) {
        let events = [
            r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#,
            r#"data: {"choices":[{"delta":{"content":"Temp"}}]}"#,
            ": keep-alive",
            r#"data: {"choices":[{"delta":{"content":"erature ok"}}]}"#,
            "data: [DONE]",
            r#"data: {"choices":[{"delta":{"content":"ignored"}}]}"#,
        ];
        let sse = events.map(|e| format!("{e}\n\n")).concat();
        return ([(CONTENT_TYPE, "text/event-stream")], sse).into_response();
    }
    Json(json!({
        "choices": [{ "message": { "role": "assistant", "content": "Pong!" } }]
    }))
    .into_response()
}

/// Serve the model API only under `/openai/v1`.
async fn spawn_server() -> Result<LlmConfig> {
    // ---
    let app = Router::new()
        .route("/openai/v1/models", get(models))
        .route("/openai/v1/chat/completions", post(completions));

    let listener = tokio::net::TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0))).await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });

    Ok(LlmConfig {
        base_url: format!("http://{addr}/v1"),
        model: "qwen2.5-7b".into(),
        api_key: "sk-test".into(),
        temperature: 0.2,
        max_tokens: 256,
        tool_directives: true,
        summarize_tool_results: false,
    })
}

#[tokio::test]
async fn preflight_switches_to_alternate_base() -> Result<()> {
    // ---
    let cfg = spawn_server().await?;
    let mut client = OpenAiClient::new(&cfg)?;

    let models = client.preflight().await?;

    assert_eq!(models, ["qwen2.5-7b"]);
    assert!(client.base_url().ends_with("/openai/v1"), "{}", client.base_url());

    let reply = client.complete(&[ChatMessage::user("Say 'Pong!'")]).await?;
    assert_eq!(reply, "Pong!");
    Ok(())
}

#[tokio::test]
async fn streamed_tokens_arrive_in_order_until_done() -> Result<()> {
    // ---
    let cfg = spawn_server().await?;
    let mut client = OpenAiClient::new(&cfg)?;
    client.preflight().await?;

    let mut tokens: Vec<String> = Vec::new();
    let text = client
        .stream(&[ChatMessage::user("status?")], &mut |t: &str| {
            tokens.push(t.to_string())
        })
        .await?;

    assert_eq!(tokens, ["Temp", "erature ok"]);
    assert_eq!(text, "Temperature ok");
    Ok(())
}
