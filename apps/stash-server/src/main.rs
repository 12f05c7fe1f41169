mod authorize;
mod caller;
mod config;
mod error;
mod executor;
mod handlers;
mod metrics;
mod resolve;
mod sanitize;
mod server;

use clap::{Parser, Subcommand};
use stash_analytics::{Analytics, Emitter};
use stash_analytics_posthog::PostHogClient;
use stash_storage::Store;
use stash_store_sqlite::SqliteStore;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing_subscriber::EnvFilter;

use config::ServerConfig;
use handlers::health::{health_router, HealthState};
use server::{router, StashServer};

const DEFAULT_DATABASE_URL: &str = "sqlite://stash.db?mode=rwc";

// ────────────────────────────────────── CLI Types ──────────────────────────────────────

#[derive(Parser)]
#[command(name = "stash-server")]
#[command(about = "Stash secret store HTTP server")]
struct Cli {
    /// Database URL (sqlite://path/to/db.db)
    #[arg(long, global = true, env = "DATABASE_URL", default_value = DEFAULT_DATABASE_URL)]
    database_url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the HTTP API server
    Serve {
        /// API listen address
        #[arg(long, default_value = "0.0.0.0:8080")]
        addr: String,

        /// Health check HTTP server address
        #[arg(long, default_value = "0.0.0.0:8081")]
        health_addr: String,
    },
    /// Apply database migrations and exit
    Migrate,
}

// ────────────────────────────────────── Serve ──────────────────────────────────────

fn build_emitter(config: &ServerConfig) -> Result<Emitter, Box<dyn std::error::Error>> {
    match &config.posthog {
        Some(posthog) => {
            let sink: Arc<dyn Analytics> = Arc::new(PostHogClient::new(posthog.clone())?);
            Ok(Emitter::new(sink))
        }
        None => {
            tracing::info!("analytics disabled");
            Ok(Emitter::disabled())
        }
    }
}

async fn cmd_serve(
    database_url: &str,
    addr: &str,
    health_addr: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let addr: SocketAddr = addr.parse()?;
    let health_addr: SocketAddr = health_addr.parse()?;

    let config = ServerConfig::from_env()?;
    tracing::info!(
        analytics = config.analytics_enabled(),
        max_body_bytes = config.max_body_bytes,
        "configuration loaded"
    );
    let metrics_handle = metrics::init_metrics()?;

    let store: Arc<dyn Store> = Arc::new(SqliteStore::open(database_url).await?);
    let analytics = build_emitter(&config)?;
    let server = StashServer::new(store, analytics, config);

    // /readyz flips to ok once the API listener is bound
    let (readiness_tx, readiness_rx) = watch::channel(false);
    let health = health_router(HealthState::new(readiness_rx, Some(metrics_handle)));

    let api_listener = tokio::net::TcpListener::bind(addr).await?;
    let health_listener = tokio::net::TcpListener::bind(health_addr).await?;

    tracing::info!(addr = %api_listener.local_addr()?, "stash-server listening");
    tracing::info!(addr = %health_listener.local_addr()?, "health checks listening");

    let _ = readiness_tx.send(true);

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let shutdown_tx_clone = shutdown_tx.clone();
    tokio::spawn(async move {
        shutdown_signal(Some(readiness_tx)).await;
        let _ = shutdown_tx_clone.send(());
    });

    let mut shutdown_rx1 = shutdown_tx.subscribe();
    let health_server = axum::serve(health_listener, health).with_graceful_shutdown(async move {
        let _ = shutdown_rx1.recv().await;
    });

    let mut shutdown_rx2 = shutdown_tx.subscribe();
    let api_server =
        axum::serve(api_listener, router(server)).with_graceful_shutdown(async move {
            let _ = shutdown_rx2.recv().await;
        });

    let (api_result, health_result) = tokio::join!(api_server, health_server);
    api_result?;
    health_result?;

    tracing::info!("shutdown complete");
    Ok(())
}

async fn cmd_migrate(database_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    // Opening the store runs any pending migrations.
    SqliteStore::open(database_url).await?;
    tracing::info!("migrations applied");
    Ok(())
}

async fn shutdown_signal(readiness_tx: Option<watch::Sender<bool>>) {
    use tokio::signal::unix::{signal, SignalKind};

    let (mut sigterm, mut sigint) =
        match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(term), Ok(int)) => (term, int),
            (Err(e), _) | (_, Err(e)) => {
                tracing::error!(error = %e, "failed to install signal handlers");
                // Fall back to ctrl-c only.
                let _ = tokio::signal::ctrl_c().await;
                if let Some(tx) = readiness_tx {
                    let _ = tx.send(false);
                }
                return;
            }
        };

    tokio::select! {
        _ = sigterm.recv() => {
            tracing::info!("received SIGTERM, shutting down gracefully");
        }
        _ = sigint.recv() => {
            tracing::info!("received SIGINT, shutting down gracefully");
        }
    }

    // Mark not ready so load balancers drain traffic first
    if let Some(tx) = readiness_tx {
        let _ = tx.send(false);
    }
}

// ────────────────────────────────────── Main ──────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve { addr, health_addr } => {
            cmd_serve(&cli.database_url, &addr, &health_addr).await?;
        }
        Command::Migrate => {
            cmd_migrate(&cli.database_url).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests;
