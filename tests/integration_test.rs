use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_test::assert_ok;

use live_data_agent::{routes, ChatModel, QueryEngine};

mod common;

use common::{build_router, settings, unavailable, FakeChat, FakeEngine};

#[derive(Debug, Deserialize)]
struct Sensor {
    sensor_id: String,
    name: String,
}

/// Serve the API on an ephemeral port and return its base URL.
async fn spawn_app(engine: Arc<dyn QueryEngine>, chat: Arc<dyn ChatModel>) -> Result<String> {
    // ---
    let app = routes::router(Arc::new(build_router(engine, chat, settings())));
    let listener = tokio::net::TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0))).await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });
    Ok(format!("http://{addr}"))
}

async fn default_app() -> Result<String> {
    spawn_app(Arc::new(FakeEngine::new()), Arc::new(FakeChat::default())).await
}

#[tokio::test]
async fn health_reports_ok() -> Result<()> {
    // ---
    let base = default_app().await?;
    let body: Value = Client::new()
        .get(format!("{base}/api/health"))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(body, json!({ "ok": true }));
    Ok(())
}

#[tokio::test]
async fn sensors_are_listed_in_order() -> Result<()> {
    // ---
    let base = default_app().await?;
    let resp = Client::new().get(format!("{base}/api/sensors")).send().await?;
    assert_eq!(resp.status(), StatusCode::OK);

    let sensors: Vec<Sensor> = resp.json().await?;
    assert!(sensors.len() <= 200);
    let ids: Vec<&str> = sensors.iter().map(|s| s.sensor_id.as_str()).collect();
    assert_eq!(ids, ["HUM_01", "TEMP_01", "TEMP_02"]);
    assert_eq!(sensors[0].name, "HUM_01 probe");
    Ok(())
}

#[tokio::test]
async fn sensor_query_by_path_and_by_param() -> Result<()> {
    // ---
    let base = default_app().await?;
    let client = Client::new();

    for url in [
        format!("{base}/api/sensor/TEMP_01?window=15m"),
        format!("{base}/api/sensor?sensor_id=TEMP_01&window=15m&start=&end="),
    ] {
        let resp = client.get(&url).send().await?;
        assert_eq!(resp.status(), StatusCode::OK, "{url}");

        let body: Value = resp.json().await?;
        assert_eq!(body["sensor_id"], "TEMP_01");
        assert_eq!(body["summary"]["count"], 60);
        let points = assert_ok!(body["last_points"].as_array().ok_or("no points"));
        assert_eq!(points.len(), 10);
    }
    Ok(())
}

#[tokio::test]
async fn bad_window_is_a_client_error() -> Result<()> {
    // ---
    let base = default_app().await?;
    let resp = Client::new()
        .get(format!("{base}/api/sensor/TEMP_01?window=5w"))
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let body: Value = resp.json().await?;
    assert!(body["error"].as_str().unwrap_or_default().contains("5w"));
    Ok(())
}

#[tokio::test]
async fn missing_sensor_id_param_is_a_client_error() -> Result<()> {
    // ---
    let base = default_app().await?;
    let resp = Client::new().get(format!("{base}/api/sensor")).send().await?;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn backend_failures_return_error_payload() -> Result<()> {
    // ---
    let engine = Arc::new(FakeEngine {
        fail: Some("catalog 'timescale' does not exist".into()),
        ..FakeEngine::default()
    });
    let base = spawn_app(engine, Arc::new(FakeChat::default())).await?;

    let resp = Client::new().get(format!("{base}/api/sensors")).send().await?;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let body: Value = resp.json().await?;
    assert_eq!(
        body,
        json!({ "error": "TABLE_NOT_FOUND: catalog 'timescale' does not exist" })
    );
    Ok(())
}

#[tokio::test]
async fn chat_runs_the_tool_router() -> Result<()> {
    // ---
    let chat = Arc::new(FakeChat::replying(["Hello from the model"]));
    let base = spawn_app(Arc::new(FakeEngine::new()), chat.clone()).await?;
    let client = Client::new();

    let resp = client
        .post(format!("{base}/api/chat"))
        .json(&json!({ "message": "list sensors" }))
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let text = resp.text().await?;
    assert!(text.contains("TEMP_02"), "{text}");
    assert_eq!(chat.calls(), 0);

    let resp = client
        .post(format!("{base}/api/chat"))
        .json(&json!({ "message": "hello" }))
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.text().await?, "Hello from the model");
    Ok(())
}

#[tokio::test]
async fn chat_failures_return_server_error_text() -> Result<()> {
    // ---
    let chat = Arc::new(FakeChat::scripted([Err(unavailable()), Err(unavailable())]));
    let base = spawn_app(Arc::new(FakeEngine::new()), chat).await?;

    let resp = Client::new()
        .post(format!("{base}/api/chat"))
        .json(&json!({ "message": "hello" }))
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(resp.text().await?.starts_with("[chat error]"));
    Ok(())
}
