use anyhow::Context;
use clap::Parser;
use factorbench_core::{shutdown::shutdown_signal, telemetry::init_telemetry};
use factorbench_driver::{
    api::router,
    config::{CliArgs, Command, DriverConfig, RunParams},
    coordinator::{Coordinator, RunOutcome},
    error::CancelCause,
    workload::generate,
};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let providers = init_telemetry("factorbench-driver")?;

    // Flush telemetry on every exit path, including failed commands.
    let outcome = execute(args).await;
    providers.shutdown();
    outcome
}

async fn execute(args: CliArgs) -> anyhow::Result<()> {
    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(DriverConfig::try_from(args.driver)?).await,
        Command::Run {
            requests,
            duration_ms,
        } => run_once(DriverConfig::try_from(args.driver)?, requests, duration_ms).await,
        Command::Generate {
            count,
            output,
            seed,
        } => {
            let seed = seed.unwrap_or(args.driver.seed);
            let numbers = generate::generate(count, seed as u64);
            generate::write(&output, &numbers)
                .await
                .with_context(|| format!("failed to write {}", output.display()))?;
            tracing::info!(count, seed, "Wrote workload to {}", output.display());
            Ok(())
        }
    }
}

async fn serve(config: DriverConfig) -> anyhow::Result<()> {
    let listener = TcpListener::bind(&config.listen_addr).await?;
    if cfg!(debug_assertions) {
        tracing::info!(
            "Starting control API on {} with full config: {:#?}",
            config.listen_addr,
            config
        );
    } else {
        tracing::info!("Starting control API on {}", config.listen_addr);
    }

    let coordinator = Coordinator::new(config)?;
    let shutdown = CancellationToken::new();
    axum::serve(listener, router(coordinator, shutdown.clone()))
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            tracing::info!("Shutdown signal received, terminating gracefully...");
            // Runs in flight would otherwise hold the drain open.
            shutdown.cancel();
        })
        .await?;

    tracing::info!("Control API shut down successfully");
    Ok(())
}

async fn run_once(
    config: DriverConfig,
    requests: usize,
    duration_ms: Option<u64>,
) -> anyhow::Result<()> {
    let coordinator = Coordinator::new(config)?;
    let params = RunParams::from_raw(requests, 0, 0).with_deadline(duration_ms.map(Duration::from_millis));

    let token = CancellationToken::new();
    let signal_token = token.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        tracing::info!("Shutdown signal received, cancelling run...");
        signal_token.cancel();
    });

    let result = coordinator.start(&params, &token).await?;
    println!("{}", serde_json::to_string_pretty(&result.summary())?);

    match result.outcome {
        // A bounded run is expected to be cut short.
        RunOutcome::Completed | RunOutcome::Cancelled(CancelCause::Deadline) => Ok(()),
        RunOutcome::Cancelled(cause) => Err(anyhow::anyhow!("run stopped: {cause}")),
    }
}
