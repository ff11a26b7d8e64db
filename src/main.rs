use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use agent_relay::api::{build_router, AppState};
use agent_relay::config::RelayConfig;
use agent_relay::engine::SubprocessEngine;
use agent_relay::session::SessionManager;

#[derive(Parser)]
#[command(name = "agent-relay", about = "SSE streaming adapter for agent engines")]
struct Cli {
    /// Path to a TOML configuration file (falls back to $AGENT_RELAY_CONFIG)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the bind host
    #[arg(long)]
    host: Option<String>,

    /// Override the bind port
    #[arg(long)]
    port: Option<u16>,

    /// Override the engine command
    #[arg(long)]
    engine: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = RelayConfig::load(cli.config.as_deref())?;
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(engine) = cli.engine {
        config.engine.command = engine;
    }

    let engine = Arc::new(SubprocessEngine::new(
        config.engine.command.clone(),
        config.engine.args.clone(),
    ));
    let sessions = Arc::new(SessionManager::new(engine));
    let app = build_router(
        AppState {
            sessions: sessions.clone(),
            keep_alive: std::time::Duration::from_secs(config.keep_alive_secs),
        },
        &config.cors_origins,
    );

    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, engine = %config.engine.command, "agent-relay listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(sessions))
        .await?;

    Ok(())
}

/// Wait for ctrl-c, then abort every session so SSE subscribers drain
/// `[DONE]` before the process exits.
async fn shutdown_signal(sessions: Arc<SessionManager>) {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("Shutting down");
    sessions.shutdown().await;
}
