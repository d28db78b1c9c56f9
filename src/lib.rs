//! Live data agent: routes chat input either to bounded sensor queries or to
//! a language model.
//!
//! This crate follows the Explicit Module Boundary Pattern (EMBP): sibling
//! modules talk to each other through the items re-exported here, and the
//! binary (`main.rs`) only wires configuration, backends and surfaces.

pub mod config;
pub mod engine;
pub mod error;
pub mod intent;
pub mod llm;
pub mod models;
pub mod present;
pub mod prompts;
pub mod query;
pub mod router;
pub mod routes;
pub mod terminal;

pub use config::Config;
pub use engine::{Blocking, BlockingQueryEngine, Dialect, QueryEngine, Row, SqlValue, Statement};
pub use error::{ChatError, EngineError, ParseError, ToolError};
pub use llm::{ChatMessage, ChatModel, OpenAiClient};
pub use models::{SensorQueryRequest, ToolOutput, ToolRequest};
pub use query::{SensorQueries, Topology};
pub use router::{RoutedResponse, RouterSettings, ToolRouter};
