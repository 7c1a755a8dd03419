//! Nexus entry point.
//!
//! This binary is the composition root. It:
//!
//! 1. loads configuration from the environment (and `.env`, if present);
//! 2. installs the `tracing` subscriber, with optional OTLP export;
//! 3. builds the backends, store, cache and detached work pool that are
//!    configured, and hands them to the [`orchestrator::Orchestrator`];
//! 4. serves the HTTP API until Ctrl-C, then drains background work.
//!
//! The `generate` and `register` subcommands are small HTTP clients for a
//! running server.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use domain::{ResponseCache, UsageLogStore};
use listener::AppState;
use llm::{GeminiBackend, OpenAiBackend, GEMINI_KEY, OPENAI_KEY};
use orchestrator::{BackendRegistry, DetachedWorkPool, GatewayMetrics, Orchestrator};
use storage::{MemoryResponseCache, MemoryUsageLogStore, PostgresUsageLogStore, RedisResponseCache};
use tokio::net::TcpListener;
use tracing::{info, warn};

mod client;
mod config;
mod telemetry;

use crate::client::GenerateArgs;
use crate::config::{CacheSettings, NexusConfig, StoreSettings};

/// Time allowed for queued cache writes and usage logs after shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:8080";

/// Nexus: a caching, usage-logging gateway in front of LLM backends.
#[derive(Parser)]
#[command(name = "nexus", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server (default)
    Serve,

    /// Send a prompt to a running server
    Generate {
        /// Server base URL
        #[arg(long, default_value = DEFAULT_SERVER_URL)]
        addr: String,

        #[arg(short, long)]
        prompt: String,

        /// Backend to use, e.g. `openai` or `gemini`
        #[arg(long)]
        provider: Option<String>,

        /// Registered user id
        #[arg(short, long)]
        user: Option<String>,

        #[arg(long)]
        temperature: Option<f64>,

        #[arg(long)]
        max_tokens: Option<u32>,
    },

    /// Register a user on a running server
    Register {
        /// Server base URL
        #[arg(long, default_value = DEFAULT_SERVER_URL)]
        addr: String,

        #[arg(short, long)]
        name: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Generate {
            addr,
            prompt,
            provider,
            user,
            temperature,
            max_tokens,
        }) => {
            let args = GenerateArgs {
                prompt,
                provider,
                user_id: user,
                temperature,
                max_tokens,
            };
            print_json(&client::generate(&addr, &args).await?)
        }
        Some(Commands::Register { addr, name }) => print_json(&client::register(&addr, &name).await?),
        Some(Commands::Serve) | None => serve().await,
    }
}

fn print_json(value: &serde_json::Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn serve() -> anyhow::Result<()> {
    let config = NexusConfig::from_env().context("invalid configuration")?;
    let _telemetry = telemetry::init(config.log_format, config.otlp_endpoint.as_deref())?;

    let registry = build_registry(&config)?;
    if registry.is_empty() {
        warn!("no backends configured; set OPENAI_API_KEY or GEMINI_API_KEY");
    }
    let backends: Vec<&str> = registry.names().map(|name| name.as_str()).collect();
    info!(?backends, "backends registered");

    let mut builder = Orchestrator::builder(registry).config(config.orchestrator.clone());
    if let Some(store) = connect_store(&config.store).await {
        builder = builder.usage_store(store);
    }
    if let Some(cache) = connect_cache(&config.cache).await {
        builder = builder.cache(cache);
    }

    let pool = Arc::new(DetachedWorkPool::start(
        config.detached,
        Arc::new(GatewayMetrics::new()),
    ));
    let orchestrator = Arc::new(builder.detached_pool(pool).build());

    let socket = TcpListener::bind(config.server_addr)
        .await
        .with_context(|| format!("binding {}", config.server_addr))?;
    listener::serve(socket, AppState::new(orchestrator.clone()), shutdown_signal())
        .await
        .context("http server failed")?;

    info!("draining background work");
    if !orchestrator.shutdown(SHUTDOWN_GRACE).await {
        warn!(grace = ?SHUTDOWN_GRACE, "background work abandoned at shutdown");
    }
    Ok(())
}

fn build_registry(config: &NexusConfig) -> anyhow::Result<BackendRegistry> {
    let mut builder = BackendRegistry::builder();
    if let Some(settings) = &config.openai {
        let backend = OpenAiBackend::new(settings.clone()).context("building OpenAI backend")?;
        builder = builder.register(OPENAI_KEY, Arc::new(backend))?;
    }
    if let Some(settings) = &config.gemini {
        let backend = GeminiBackend::new(settings.clone()).context("building Gemini backend")?;
        builder = builder.register(GEMINI_KEY, Arc::new(backend))?;
    }
    Ok(builder.build())
}

/// Connection failures are logged and the server runs without a store.
async fn connect_store(settings: &StoreSettings) -> Option<Arc<dyn UsageLogStore>> {
    match settings {
        StoreSettings::Postgres { url } => match PostgresUsageLogStore::builder(url.as_str()).build().await {
            Ok(store) => Some(Arc::new(store)),
            Err(error) => {
                warn!(%error, "postgres unavailable; usage logging and registration disabled");
                None
            }
        },
        StoreSettings::Memory => Some(Arc::new(MemoryUsageLogStore::new())),
        StoreSettings::None => None,
    }
}

/// Connection failures are logged and the server runs without a cache.
async fn connect_cache(settings: &CacheSettings) -> Option<Arc<dyn ResponseCache>> {
    match settings {
        CacheSettings::Redis { url } => match RedisResponseCache::connect(url).await {
            Ok(cache) => Some(Arc::new(cache)),
            Err(error) => {
                warn!(%error, "redis unavailable; response caching disabled");
                None
            }
        },
        CacheSettings::Memory { max_entries } => {
            Some(Arc::new(MemoryResponseCache::with_max_entries(*max_entries)))
        }
        CacheSettings::None => None,
    }
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(%error, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
