//! In-process fakes for the query backend and the language model.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;

use live_data_agent::config::TableConfig;
use live_data_agent::engine::BlockingQueryEngine;
use live_data_agent::{
    ChatError, ChatMessage, ChatModel, Dialect, EngineError, QueryEngine, Row, RouterSettings,
    SensorQueries, SqlValue, Statement, ToolRouter,
};

pub fn tables() -> TableConfig {
    TableConfig {
        catalog: "timescale".into(),
        schema: "public".into(),
        metadata_table: "sensor_metadata".into(),
        metrics_table: "sensor_readings".into(),
    }
}

fn ts(minute: u32) -> SqlValue {
    SqlValue::Timestamp(
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(12, minute, 0)
            .unwrap(),
    )
}

/// Canned rows keyed on the statement shape.
pub fn canned_rows(statement: &Statement, empty: bool) -> Vec<Row> {
    // ---
    let sql = &statement.sql;
    if sql.contains("AS agg_value") {
        return if empty {
            vec![vec![SqlValue::Null, SqlValue::Int(0)]]
        } else {
            vec![vec![SqlValue::Float(21.5), SqlValue::Int(12)]]
        };
    }
    if sql.contains("AS first_ts") {
        return if empty {
            vec![vec![
                SqlValue::Null,
                SqlValue::Null,
                SqlValue::Int(0),
                SqlValue::Null,
                SqlValue::Null,
                SqlValue::Null,
            ]]
        } else {
            vec![vec![
                ts(0),
                ts(59),
                SqlValue::Int(60),
                SqlValue::Float(20.25),
                SqlValue::Float(18.0),
                SqlValue::Decimal("23.50".into()),
            ]]
        };
    }
    if sql.contains("ORDER BY \"timestamp\" DESC") {
        if empty {
            return Vec::new();
        }
        // The engine honours LIMIT like a real database would.
        let limit = sql
            .rsplit("LIMIT ")
            .next()
            .and_then(|n| n.trim().parse::<u32>().ok())
            .unwrap_or(10);
        return (0..60u32)
            .rev()
            .take(limit as usize)
            .map(|m| vec![ts(m), SqlValue::Float(f64::from(m))])
            .collect();
    }
    if sql.contains("ORDER BY sensor_id") {
        return ["TEMP_02", "HUM_01", "TEMP_01"]
            .iter()
            .map(|id| vec![SqlValue::Text(id.to_string()), SqlValue::Text(format!("{id} probe"))])
            .collect();
    }
    if sql.contains("LIMIT 1") && !empty {
        return vec![vec![
            SqlValue::Text("TEMP_01".into()),
            SqlValue::Text("Boiler room".into()),
        ]];
    }
    Vec::new()
}

/// Async engine that records every statement it executes.
#[derive(Default)]
pub struct FakeEngine {
    pub statements: Mutex<Vec<Statement>>,
    pub delay: Option<Duration>,
    pub empty: bool,
    pub fail: Option<String>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.statements.lock().unwrap().len()
    }

    pub fn executed(&self) -> Vec<Statement> {
        self.statements.lock().unwrap().clone()
    }
}

#[async_trait]
impl QueryEngine for FakeEngine {
    fn dialect(&self) -> Dialect {
        Dialect::Trino
    }

    async fn fetch_all(&self, statement: &Statement) -> Result<Vec<Row>, EngineError> {
        self.statements.lock().unwrap().push(statement.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = &self.fail {
            return Err(EngineError::Query {
                name: "TABLE_NOT_FOUND".into(),
                message: message.clone(),
            });
        }
        Ok(canned_rows(statement, self.empty))
    }
}

/// Synchronous engine that blocks its thread.
pub struct SleepySyncEngine {
    pub sleep: Duration,
}

impl BlockingQueryEngine for SleepySyncEngine {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    fn fetch_all(&self, statement: &Statement) -> anyhow::Result<Vec<Row>> {
        std::thread::sleep(self.sleep);
        Ok(canned_rows(statement, false))
    }
}

/// Scripted chat model; replies are consumed in order.
#[derive(Default)]
pub struct FakeChat {
    replies: Mutex<VecDeque<Result<String, ChatError>>>,
    pub requests: Mutex<Vec<Vec<ChatMessage>>>,
}

impl FakeChat {
    pub fn replying<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::scripted(replies.into_iter().map(|r| Ok(r.into())))
    }

    pub fn scripted<I>(replies: I) -> Self
    where
        I: IntoIterator<Item = Result<String, ChatError>>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            requests: Mutex::default(),
        }
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

pub fn unavailable() -> ChatError {
    ChatError::Status {
        status: 503,
        body: "model loading".into(),
    }
}

#[async_trait]
impl ChatModel for FakeChat {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ChatError> {
        self.requests.lock().unwrap().push(messages.to_vec());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok("(no reply scripted)".into()))
    }
}

pub fn settings() -> RouterSettings {
    RouterSettings {
        tool_timeout: Duration::from_secs(2),
        tool_directives: true,
        summarize_tool_results: false,
    }
}

pub fn build_router(
    engine: Arc<dyn QueryEngine>,
    chat: Arc<dyn ChatModel>,
    settings: RouterSettings,
) -> ToolRouter {
    let queries = Arc::new(SensorQueries::new(engine, tables()));
    ToolRouter::new(queries, chat, settings)
}
