//! Trino client protocol against a mock coordinator.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use axum::{
    extract::State,
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};

use live_data_agent::config::TrinoConfig;
use live_data_agent::engine::TrinoEngine;
use live_data_agent::models::{SensorQueryRequest, TimeWindow};
use live_data_agent::{EngineError, SensorQueries, ToolError};

mod common;

#[derive(Clone, Default)]
struct Coordinator {
    base: Arc<Mutex<String>>,
    /// `(X-Trino-User, X-Trino-Prepared-Statement, body)` per POST.
    posts: Arc<Mutex<Vec<(String, Option<String>, String)>>>,
    pages_fetched: Arc<Mutex<u32>>,
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

async fn submit(State(state): State<Coordinator>, headers: HeaderMap, body: String) -> Json<Value> {
    // ---
    let user = header(&headers, "X-Trino-User").unwrap_or_default();
    let prepared = header(&headers, "X-Trino-Prepared-Statement");
    state
        .posts
        .lock()
        .unwrap()
        .push((user, prepared.clone(), body.clone()));

    if body.contains("broken") {
        return Json(json!({
            "id": "q2",
            "error": { "message": "line 1:15: Table 'broken' does not exist", "errorName": "TABLE_NOT_FOUND" }
        }));
    }

    let base = state.base.lock().unwrap().clone();
    if prepared.as_deref().is_some_and(|sql| sql.contains("agg_value")) {
        return Json(json!({
            "id": "q4",
            "columns": [
                { "name": "agg_value", "type": "double" },
                { "name": "row_count", "type": "bigint" }
            ],
            "data": [[21.5, 12]]
        }));
    }
    if body.starts_with("EXECUTE") {
        return Json(json!({
            "id": "q3",
            "columns": [
                { "name": "first_ts", "type": "timestamp(3) with time zone" },
                { "name": "last_ts", "type": "timestamp(3) with time zone" },
                { "name": "row_count", "type": "bigint" },
                { "name": "avg_value", "type": "double" },
                { "name": "min_value", "type": "double" },
                { "name": "max_value", "type": "double" }
            ],
            "data": [[
                "2024-05-01 12:00:00.000 UTC",
                "2024-05-01 12:59:00.000 UTC",
                60, 20.25, 18.0, 23.5
            ]]
        }));
    }

    Json(json!({
        "id": "q1",
        "nextUri": format!("{base}/v1/statement/executing/q1/1"),
        "columns": [
            { "name": "sensor_id", "type": "varchar" },
            { "name": "name", "type": "varchar" }
        ],
        "data": [["TEMP_02", "Loading dock"]]
    }))
}

async fn next_page(State(state): State<Coordinator>) -> Json<Value> {
    // ---
    *state.pages_fetched.lock().unwrap() += 1;
    Json(json!({
        "id": "q1",
        "data": [["TEMP_01", null], ["HUM_01", "Cold store"]]
    }))
}

async fn spawn_coordinator() -> Result<(Coordinator, TrinoConfig)> {
    // ---
    let state = Coordinator::default();
    let app = Router::new()
        .route("/v1/statement", post(submit))
        .route("/v1/statement/executing/q1/1", get(next_page))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0))).await?;
    let addr = listener.local_addr()?;
    *state.base.lock().unwrap() = format!("http://{addr}");
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });

    let cfg = TrinoConfig {
        host: "127.0.0.1".into(),
        port: addr.port(),
        user: "analyst".into(),
        password: Some("secret".into()),
    };
    Ok((state, cfg))
}

#[tokio::test]
async fn pages_are_followed_and_rows_shaped() -> Result<()> {
    // ---
    let (coordinator, cfg) = spawn_coordinator().await?;
    let engine = TrinoEngine::new(&cfg, &common::tables())?;
    let queries = SensorQueries::new(Arc::new(engine), common::tables());

    let sensors = queries.list_sensors().await?;

    let ids: Vec<&str> = sensors.iter().map(|s| s.sensor_id.as_str()).collect();
    assert_eq!(ids, ["HUM_01", "TEMP_01", "TEMP_02"]);
    assert_eq!(sensors[1].display_name, "TEMP_01");
    assert_eq!(*coordinator.pages_fetched.lock().unwrap(), 1);

    let posts = coordinator.posts.lock().unwrap();
    assert_eq!(posts.len(), 1);
    let (user, prepared, body) = &posts[0];
    assert_eq!(user, "analyst");
    assert!(prepared.is_none());
    assert!(body.contains("FROM timescale.public.sensor_metadata"));
    Ok(())
}

#[tokio::test]
async fn parameters_travel_as_prepared_statement() -> Result<()> {
    // ---
    let (coordinator, cfg) = spawn_coordinator().await?;
    let engine = TrinoEngine::new(&cfg, &common::tables())?;
    let queries = SensorQueries::new(Arc::new(engine), common::tables());

    let mut request = SensorQueryRequest::new("TEMP_01' OR '1'='1");
    request.window = TimeWindow::Relative("60m".parse()?);
    let aggregate = queries.aggregate_sensor(&request).await?;
    assert_eq!(aggregate.value, Some(21.5));
    assert_eq!(aggregate.count, 12);

    let posts = coordinator.posts.lock().unwrap();
    let (_, prepared, body) = &posts[0];
    let prepared = prepared.as_deref().unwrap_or_default();
    assert!(prepared.starts_with("live_data_query="));
    assert!(!prepared.contains("TEMP_01"));
    assert_eq!(
        body,
        "EXECUTE live_data_query USING 'TEMP_01'' OR ''1''=''1', 60"
    );
    Ok(())
}

#[tokio::test]
async fn summary_columns_are_normalized() -> Result<()> {
    // ---
    let (_coordinator, cfg) = spawn_coordinator().await?;
    let engine = TrinoEngine::new(&cfg, &common::tables())?;
    let queries = SensorQueries::new(Arc::new(engine), common::tables());

    let result = queries.query_sensor(&SensorQueryRequest::new("TEMP_01")).await?;

    assert_eq!(result.summary.count, 60);
    assert_eq!(result.summary.first_ts.as_deref(), Some("2024-05-01T12:00:00Z"));
    assert_eq!(result.summary.max, Some(23.5));
    Ok(())
}

#[tokio::test]
async fn query_errors_are_reported_by_name() -> Result<()> {
    // ---
    let (_coordinator, cfg) = spawn_coordinator().await?;
    let tables = live_data_agent::config::TableConfig {
        metadata_table: "broken".into(),
        ..common::tables()
    };
    let engine = TrinoEngine::new(&cfg, &tables)?;
    let queries = SensorQueries::new(Arc::new(engine), tables);

    let err = queries.list_sensors().await.unwrap_err();

    match err {
        ToolError::Engine(EngineError::Query { name, message }) => {
            assert_eq!(name, "TABLE_NOT_FOUND");
            assert!(message.contains("'broken'"));
        }
        other => panic!("unexpected error: {other}"),
    }
    Ok(())
}
