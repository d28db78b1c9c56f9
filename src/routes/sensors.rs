//! Sensor listing and per-sensor query endpoints.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use tracing::{error, info};

use super::AppState;
use crate::error::ParseError;
use crate::models::{parse_timestamp, RelativeWindow, SensorQueryRequest, TimeWindow, ToolRequest};
use crate::present;
use crate::ToolRouter;

/// `?window=&start=&end=`; empty values count as absent.
#[derive(Debug, Default, Deserialize)]
struct WindowParams {
    window: Option<String>,
    start: Option<String>,
    end: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SensorParams {
    sensor_id: Option<String>,
    #[serde(flatten)]
    window: WindowParams,
}

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new()
        .route("/api/sensors", get(list_sensors))
        .route("/api/sensor", get(query_sensor_by_param))
        .route("/api/sensor/{sensor_id}", get(query_sensor))
}

async fn list_sensors(State(router): State<AppState>) -> Response {
    // ---
    info!("GET /api/sensors");
    respond(&router, ToolRequest::ListSensors).await
}

async fn query_sensor(
    State(router): State<AppState>,
    Path(sensor_id): Path<String>,
    Query(params): Query<WindowParams>,
) -> Response {
    // ---
    info!("GET /api/sensor/{}", sensor_id);
    run_query(&router, &sensor_id, &params).await
}

async fn query_sensor_by_param(
    State(router): State<AppState>,
    Query(params): Query<SensorParams>,
) -> Response {
    // ---
    let Some(sensor_id) = non_empty(&params.sensor_id) else {
        return present::json_error(StatusCode::BAD_REQUEST, ParseError::MissingSensorId.to_string());
    };
    info!("GET /api/sensor?sensor_id={}", sensor_id);
    run_query(&router, sensor_id, &params.window).await
}

async fn run_query(router: &ToolRouter, sensor_id: &str, params: &WindowParams) -> Response {
    // ---
    match build_request(sensor_id, params) {
        Ok(request) => respond(router, ToolRequest::QuerySensor(request)).await,
        Err(e) => present::json_error(StatusCode::BAD_REQUEST, e.to_string()),
    }
}

async fn respond(router: &ToolRouter, request: ToolRequest) -> Response {
    // ---
    match router.invoke(&request).await {
        Ok(output) => (StatusCode::OK, Json(output)).into_response(),
        Err(e) => {
            error!("{} failed: {}", request.label(), e);
            present::json_tool_error(&e)
        }
    }
}

fn build_request(sensor_id: &str, params: &WindowParams) -> Result<SensorQueryRequest, ParseError> {
    // ---
    let relative = non_empty(&params.window)
        .map(str::parse::<RelativeWindow>)
        .transpose()?;
    let start = non_empty(&params.start).map(parse_timestamp).transpose()?;
    let end = non_empty(&params.end).map(parse_timestamp).transpose()?;

    let mut request = SensorQueryRequest::new(sensor_id);
    request.window = TimeWindow::resolve(relative, start, end);
    Ok(request)
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}
