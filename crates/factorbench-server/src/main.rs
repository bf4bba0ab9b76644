#![doc = include_str!("../README.md")]

mod server;

use clap::Parser;
use factorbench_core::{shutdown::shutdown_signal, telemetry::init_telemetry};
use server::config::{CliArgs, ServerConfig};
use server::metrics::ServerMetrics;
use server::service::handler::router;
use tokio::net::TcpListener;

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = ServerConfig::try_from(args)?;

    let providers = init_telemetry("factorbench-server")?;
    let metrics = ServerMetrics::new()?;

    let listener = TcpListener::bind(&config.listen_addr).await?;
    if cfg!(debug_assertions) {
        tracing::info!(
            "Starting factorize service on {} with full config: {:#?}",
            config.listen_addr,
            config
        );
    } else {
        tracing::info!("Starting factorize service on {}", config.listen_addr);
    }

    axum::serve(listener, router(metrics))
        .with_graceful_shutdown(async {
            shutdown_signal().await;
            tracing::info!("Shutdown signal received, terminating gracefully...");
        })
        .await?;

    tracing::info!("Service shut down successfully");
    providers.shutdown();
    Ok(())
}
