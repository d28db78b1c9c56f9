//! Configuration loader for the `live-data-agent` service.
//!
//! This module centralizes all runtime configuration values and their defaults,
//! loading from environment variables (with optional `.env` file support
//! provided by the caller). The resulting [`Config`] is built once at startup
//! and handed to each component; nothing reads the environment afterwards.
//!
use std::{env, time::Duration};

use anyhow::{anyhow, Result};

/// Parse an optional environment variable with a default value.
macro_rules! parse_var {
    ($lookup:expr, $var_name:expr, $ty:ty, $default:expr) => {
        first_var(&$lookup, &[$var_name])
            .map(|v| v.parse::<$ty>())
            .transpose()
            .map_err(|e| anyhow!("Invalid {}: {}", $var_name, e))?
            .unwrap_or($default)
    };
}

/// Parse a required string variable, accepting any of the given names.
macro_rules! require_var {
    ($lookup:expr, $($var_name:expr),+) => {
        first_var(&$lookup, &[$($var_name),+]).ok_or_else(|| {
            anyhow!(
                "{} must be set in .env or environment",
                [$($var_name),+].join(" or ")
            )
        })?
    };
}

/// Which SQL backend executes sensor queries.
#[derive(Debug, Clone)]
pub enum Backend {
    /// Trino query federation over its HTTP protocol.
    Trino(TrinoConfig),

    /// Direct PostgreSQL / TimescaleDB connection pool.
    Postgres { db_url: String, pool_max: u32 },
}

#[derive(Debug, Clone)]
pub struct TrinoConfig {
    /// Host name, optionally with an `http://` or `https://` scheme.
    pub host: String,
    pub port: u16,
    pub user: String,
    /// Basic-auth password; only sent over https.
    pub password: Option<String>,
}

/// Default catalog/schema and the canonical sensor tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableConfig {
    pub catalog: String,
    pub schema: String,
    pub metadata_table: String,
    pub metrics_table: String,
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Normalized OpenAI-compatible base URL, always ending in `/v1`.
    pub base_url: String,
    pub model: String,
    pub api_key: String,
    pub temperature: f32,
    pub max_tokens: u32,

    /// Let the model request sensor queries with a JSON directive.
    pub tool_directives: bool,

    /// Send successful directive tool output back to the model for a summary.
    pub summarize_tool_results: bool,
}

/// Strongly typed application configuration.
///
/// All fields are immutable after loading, ensuring a consistent configuration
/// snapshot for the lifetime of the application.
#[derive(Debug, Clone)]
pub struct Config {
    // ---
    /// Absent only when loaded with [`ModelSettings::Optional`] and no model
    /// endpoint is configured.
    pub llm: Option<LlmConfig>,
    pub backend: Backend,
    pub tables: TableConfig,

    /// Per tool invocation timeout.
    pub tool_timeout: Duration,

    /// HTTP listen port for `serve`.
    pub port: u16,
}

/// Whether the language model variables must be present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelSettings {
    Required,
    /// Loaded when `LLAMA_URL`/`OPENAI_BASE_URL` is set, skipped otherwise.
    Optional,
}

/// Load configuration from environment variables with defaults.
///
/// Required:
/// - `LLAMA_URL` (or `OPENAI_BASE_URL`) – model endpoint, unless
///   `model` is [`ModelSettings::Optional`]
/// - `LLAMA_MODEL` (or `OPENAI_MODEL`, `MODEL`) – model name, with the endpoint
/// - `TRINO_HOST` when `DB_BACKEND=trino` (the default)
/// - `DATABASE_URL` when `DB_BACKEND=postgres`
///
/// Returns an error if any required variable is missing or invalid.
pub fn load_from_env(model: ModelSettings) -> Result<Config> {
    // ---
    Config::from_lookup_with(|key| env::var(key).ok(), model)
}

impl LlmConfig {
    fn from_lookup<F>(lookup: &F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        // ---
        let base_url = normalize_base_url(&require_var!(lookup, "LLAMA_URL", "OPENAI_BASE_URL"));
        let model = require_var!(lookup, "LLAMA_MODEL", "OPENAI_MODEL", "MODEL");
        let api_key = first_var(lookup, &["LLAMA_API_KEY", "OPENAI_API_KEY"])
            .unwrap_or_else(|| "sk-local-not-used".to_string());

        Ok(Self {
            base_url,
            model,
            api_key,
            temperature: parse_var!(lookup, "LLM_TEMPERATURE", f32, 0.3),
            max_tokens: parse_var!(lookup, "LLM_MAX_TOKENS", u32, 800),
            tool_directives: parse_flag(lookup, "LLM_TOOL_DIRECTIVES", true)?,
            summarize_tool_results: parse_flag(lookup, "LLM_SUMMARIZE_TOOL_RESULTS", false)?,
        })
    }
}

impl Config {
    /// Build the full configuration, model settings included, from an
    /// arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        Self::from_lookup_with(lookup, ModelSettings::Required)
    }

    pub fn from_lookup_with<F>(lookup: F, model: ModelSettings) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        // ---
        let has_endpoint = first_var(&lookup, &["LLAMA_URL", "OPENAI_BASE_URL"]).is_some();
        let llm = match model {
            ModelSettings::Optional if !has_endpoint => None,
            _ => Some(LlmConfig::from_lookup(&lookup)?),
        };

        let backend_name = first_var(&lookup, &["DB_BACKEND"]).unwrap_or_else(|| "trino".into());
        let backend = match backend_name.to_ascii_lowercase().as_str() {
            "trino" => Backend::Trino(TrinoConfig {
                host: require_var!(lookup, "TRINO_HOST"),
                port: parse_var!(lookup, "TRINO_PORT", u16, 8080),
                user: first_var(&lookup, &["TRINO_USER"])
                    .unwrap_or_else(|| "live-data-agent".to_string()),
                password: first_var(&lookup, &["TRINO_PASSWORD"]),
            }),
            "postgres" | "postgresql" | "timescale" => Backend::Postgres {
                db_url: require_var!(lookup, "DATABASE_URL"),
                pool_max: parse_var!(lookup, "DB_POOL_MAX", u32, 5),
            },
            other => return Err(anyhow!("Invalid DB_BACKEND: {other} (expected trino or postgres)")),
        };

        let tables = TableConfig {
            catalog: first_var(&lookup, &["TRINO_CATALOG"]).unwrap_or_else(|| "timescale".into()),
            schema: first_var(&lookup, &["TRINO_SCHEMA"]).unwrap_or_else(|| "public".into()),
            metadata_table: first_var(&lookup, &["TRINO_SENSOR_TABLE"])
                .unwrap_or_else(|| "timescale.public.sensor_metadata".into()),
            metrics_table: first_var(&lookup, &["TRINO_METRICS_TABLE"])
                .unwrap_or_else(|| "timescale.public.sensor_readings".into()),
        };

        let timeout_secs = parse_var!(lookup, "TOOL_TIMEOUT_S", u64, 10);
        if timeout_secs == 0 {
            return Err(anyhow!("Invalid TOOL_TIMEOUT_S: must be at least 1"));
        }

        Ok(Config {
            llm,
            backend,
            tables,
            tool_timeout: Duration::from_secs(timeout_secs),
            port: parse_var!(lookup, "PORT", u16, 8088),
        })
    }

    /// The model settings, or the error naming the missing variable.
    pub fn llm(&self) -> Result<&LlmConfig> {
        self.llm
            .as_ref()
            .ok_or_else(|| anyhow!("LLAMA_URL or OPENAI_BASE_URL must be set in .env or environment"))
    }

    /// Log the loaded configuration for debugging purposes.
    ///
    /// Masks sensitive information like database passwords and API keys while
    /// showing all configuration values that were loaded.
    pub fn log_config(&self) {
        // ---
        tracing::info!("Configuration loaded:");
        match &self.llm {
            Some(llm) => {
                tracing::info!("  LLAMA_URL        : {}", llm.base_url);
                tracing::info!("  LLAMA_MODEL      : {}", llm.model);
                tracing::info!("  LLAMA_API_KEY    : {}", mask_secret(&llm.api_key));
                tracing::info!("  TOOL_DIRECTIVES  : {}", llm.tool_directives);
            }
            None => tracing::info!("  LLAMA_URL        : (not set)"),
        }
        match &self.backend {
            Backend::Trino(trino) => {
                tracing::info!("  DB_BACKEND       : trino");
                tracing::info!("  TRINO_HOST       : {}:{}", trino.host, trino.port);
                tracing::info!("  TRINO_USER       : {}", trino.user);
                tracing::info!(
                    "  TRINO_PASSWORD   : {}",
                    trino.password.as_deref().map(mask_secret).unwrap_or_default()
                );
            }
            Backend::Postgres { db_url, pool_max } => {
                tracing::info!("  DB_BACKEND       : postgres");
                tracing::info!("  DATABASE_URL     : {}", mask_db_url(db_url));
                tracing::info!("  DB_POOL_MAX      : {}", pool_max);
            }
        }
        tracing::info!("  CATALOG.SCHEMA   : {}.{}", self.tables.catalog, self.tables.schema);
        tracing::info!("  SENSOR_TABLE     : {}", self.tables.metadata_table);
        tracing::info!("  METRICS_TABLE    : {}", self.tables.metrics_table);
        tracing::info!("  TOOL_TIMEOUT_S   : {}", self.tool_timeout.as_secs());
    }
}

/// Normalize an OpenAI-compatible base URL.
///
/// Adds `http://` when no scheme is given, strips trailing slashes and appends
/// `/v1` when missing.
pub fn normalize_base_url(url: &str) -> String {
    // ---
    let mut url = url.trim().to_string();
    if !url.starts_with("http://") && !url.starts_with("https://") {
        url = format!("http://{url}");
    }
    let mut url = url.trim_end_matches('/').to_string();
    if !url.ends_with("/v1") {
        url.push_str("/v1");
    }
    url
}

/// First non-empty value among `names`.
fn first_var<F>(lookup: &F, names: &[&str]) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    names
        .iter()
        .filter_map(|name| lookup(name))
        .map(|v| v.trim().to_string())
        .find(|v| !v.is_empty())
}

fn parse_flag<F>(lookup: &F, name: &str, default: bool) -> Result<bool>
where
    F: Fn(&str) -> Option<String>,
{
    // ---
    match first_var(lookup, &[name]).map(|v| v.to_ascii_lowercase()).as_deref() {
        None => Ok(default),
        Some("1") | Some("true") | Some("yes") | Some("on") => Ok(true),
        Some("0") | Some("false") | Some("no") | Some("off") => Ok(false),
        Some(other) => Err(anyhow!("Invalid {name}: {other} (expected true or false)")),
    }
}

fn mask_secret(secret: &str) -> String {
    if secret.is_empty() {
        String::new()
    } else {
        "****".to_string()
    }
}

/// Mask the password in a database URL.
fn mask_db_url(db_url: &str) -> String {
    // ---
    if let Some(at_pos) = db_url.rfind('@') {
        if let Some(colon_pos) = db_url[..at_pos].rfind(':') {
            return format!("{}:****{}", &db_url[..colon_pos], &db_url[at_pos..]);
        }
    }
    db_url.to_string()
}
