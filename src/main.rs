use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use knowledge_gateway::api::{GatewayState, create_router};
use knowledge_gateway::config::Config;
use tracing_subscriber::EnvFilter;

/// Backend-for-frontend gateway for the knowledge-base admin console.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Listen address (overrides GATEWAY_BIND)
    #[arg(long)]
    bind: Option<SocketAddr>,

    /// Backend base address (overrides BACKEND_URL)
    #[arg(long)]
    backend_url: Option<String>,

    /// Directory of static UI assets served outside the API prefix
    #[arg(long)]
    static_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // RUST_LOG wins; default to info. Also picks up `log` records from reqwest.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env()?;
    if let Some(bind) = cli.bind {
        config.bind_addr = bind;
    }
    if let Some(url) = cli.backend_url.as_deref() {
        config.set_backend_url(url)?;
    }
    if cli.static_dir.is_some() {
        config.static_dir = cli.static_dir;
    }

    if config.backend.credential().is_empty() {
        tracing::warn!("API_KEY is not set; backend calls will be sent unauthenticated");
    }

    let state = Arc::new(GatewayState::new(&config)?);
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(
        addr = %config.bind_addr,
        backend = %config.backend.base_address(),
        prefix = %config.public_prefix,
        "gateway listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for ctrl-c: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
