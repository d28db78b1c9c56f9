//! Application entry point for the `live-data-agent` binary.
//!
//! Startup sequence shared by every subcommand:
//! - Loading configuration from environment variables or `.env`
//! - Initializing structured logging/tracing (to stderr)
//! - Connecting the configured query backend (Trino or PostgreSQL)
//! - Probing the language model endpoint
//!
//! Then one of the surfaces runs: the terminal chat (`chat`), the HTTP API
//! (`serve`) or a one-off backend inspection (`topology`).
//!
//! # Environment Variables
//! - `LLAMA_URL` / `LLAMA_MODEL` (**required** except for `topology`) – model
//!   endpoint and name
//! - `DB_BACKEND` (optional) – `trino` (default) or `postgres`
//! - `TRINO_HOST` / `DATABASE_URL` – backend location, per `DB_BACKEND`
//! - `AXUM_LOG_LEVEL` (optional) – log verbosity (default: `info`)
//! - `AXUM_SPAN_EVENTS` (optional) – span event mode for tracing
use std::{env, net::SocketAddr, sync::Arc};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use is_terminal::IsTerminal;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

use live_data_agent::config::ModelSettings;
use live_data_agent::{
    config, engine, llm::ChatModel, llm::ChatMessage, routes, terminal, Config, OpenAiClient,
    RouterSettings, SensorQueries, ToolRouter,
};

#[derive(Parser)]
#[command(name = "live-data-agent")]
#[command(about = "Chat with a language model that can query live sensor data", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Interactive chat, or a single answer when a prompt is given
    Chat {
        /// One-shot prompt; omit for the interactive loop
        prompt: Vec<String>,
    },

    /// Serve the HTTP API
    Serve {
        /// Listen port (defaults to PORT or 8088)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Show the catalogs, schemas and tables the backend exposes
    Topology,
}

// ---

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let model = match cli.command {
        Some(Command::Topology) => ModelSettings::Optional,
        _ => ModelSettings::Required,
    };
    let cfg = config::load_from_env(model)?;
    cfg.log_config();

    let engine = engine::connect(&cfg)?;
    let queries = Arc::new(SensorQueries::new(engine, cfg.tables.clone()));

    match cli.command.unwrap_or(Command::Chat { prompt: Vec::new() }) {
        Command::Topology => print_topology(&cfg, &queries).await,
        Command::Serve { port } => {
            let chat = connect_model(&cfg, false).await?;
            serve(&cfg, port, queries, chat).await
        }
        Command::Chat { prompt } => {
            let chat = connect_model(&cfg, true).await?;
            let router = ToolRouter::new(queries, chat, RouterSettings::from_config(&cfg));
            let prompt = prompt.join(" ");
            if prompt.trim().is_empty() {
                terminal::repl(&router).await
            } else {
                terminal::one_shot(&router, &prompt).await
            }
        }
    }
}

/// Build the model client and probe the endpoint.
///
/// A failed probe is fatal when `required`; otherwise it is only logged so the
/// HTTP API can still serve sensor data.
async fn connect_model(cfg: &Config, required: bool) -> Result<Arc<dyn ChatModel>> {
    // ---
    let mut client = OpenAiClient::new(cfg.llm()?)?;

    match client.preflight().await {
        Ok(_) => {
            let hello = client
                .complete(&[ChatMessage::user("Say 'Pong!' in one word.")])
                .await;
            match hello {
                Ok(text) => tracing::info!("LLM probe: {:?}", text.trim()),
                Err(e) => tracing::warn!("LLM probe failed: {}", e),
            }
        }
        Err(e) if required => {
            return Err(e).with_context(|| {
                format!("Cannot reach {}/models or its /openai/v1 alternative", client.base_url())
            });
        }
        Err(e) => tracing::warn!("Model endpoint unavailable, chat will fail: {}", e),
    }

    tracing::info!("Using model {} at {}", client.model(), client.base_url());
    Ok(Arc::new(client))
}

async fn serve(
    cfg: &Config,
    port: Option<u16>,
    queries: Arc<SensorQueries>,
    chat: Arc<dyn ChatModel>,
) -> Result<()> {
    // ---
    let router = Arc::new(ToolRouter::new(queries, chat, RouterSettings::from_config(cfg)));
    let app = routes::router(router);

    let addr = SocketAddr::from(([0, 0, 0, 0], port.unwrap_or(cfg.port)));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn print_topology(cfg: &Config, queries: &SensorQueries) -> Result<()> {
    // ---
    let topology = queries.topology().await?;

    println!("Active catalog.schema : {}.{}", topology.catalog, topology.schema);
    println!(
        "Sensor table          : {} -> {}",
        cfg.tables.metadata_table, topology.metadata_table
    );
    println!(
        "Metrics table         : {} -> {}",
        cfg.tables.metrics_table, topology.metrics_table
    );
    println!("Catalogs              : {}", topology.catalogs.join(", "));
    println!("Schemas               : {}", topology.schemas.join(", "));
    println!("Tables                : {}", topology.tables.join(", "));
    Ok(())
}

// ---

/// Initialize the global tracing subscriber for structured logging.
///
/// Output goes to stderr so chat replies on stdout stay clean. Configured with:
/// - Log target, file, and line number output enabled
/// - Color output controlled by TTY detection and `FORCE_COLOR` env var:
///   - `FORCE_COLOR=1|true|yes`: force colors on
///   - `FORCE_COLOR=0|false|no`: force colors off
///   - unset or other values: auto-detect TTY
/// - Span event emission mode controlled by the `AXUM_SPAN_EVENTS` env var:
///   - `"full"`       : emit ENTER, EXIT, and CLOSE events with timing
///   - `"enter_exit"` : emit ENTER and EXIT only
///   - unset or other values: emit CLOSE events only (default)
/// - Log level controlled by `RUST_LOG`, falling back to `AXUM_LOG_LEVEL`
fn init_tracing() {
    // ---
    let span_events = match env::var("AXUM_SPAN_EVENTS").as_deref() {
        Ok("full") => FmtSpan::FULL,
        Ok("enter_exit") => FmtSpan::ENTER | FmtSpan::EXIT,
        _ => FmtSpan::CLOSE,
    };

    // Determine if we should use colors
    let use_color = match env::var("FORCE_COLOR").as_deref() {
        Ok("1") | Ok("true") | Ok("yes") => true,
        Ok("0") | Ok("false") | Ok("no") => false,
        _ => std::io::stderr().is_terminal(),
    };

    // Use RUST_LOG if available, otherwise fall back to AXUM_LOG_LEVEL
    let env_filter = if env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match env::var("AXUM_LOG_LEVEL").ok().as_deref() {
            Some("trace") => "trace",
            Some("debug") => "debug",
            Some("info") => "info",
            Some("warn") => "warn",
            Some("error") => "error",
            _ => "info",
        };
        EnvFilter::new(format!("{level},sqlx::query=warn"))
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(span_events)
        .with_env_filter(env_filter)
        .with_ansi(use_color)
        .compact()
        .init();
}
