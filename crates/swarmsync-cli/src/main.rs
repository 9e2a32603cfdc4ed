//! swarmsync - keeps Docker Swarm services on the latest image for their tag.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use swarmsync_reconciler::{
    DockerEngine, Driver, DriverState, Orchestrator, Reconciler, Trigger,
};
use swarmsync_registry::RegistryClient;
use tokio::sync::watch;
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod args;

use args::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    // Warnings and errors go to stderr, everything else to stdout
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "swarmsync=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr.with_max_level(Level::WARN).or_else(std::io::stdout)),
        )
        .init();

    let cli = Cli::parse();
    run(&cli).await
}

async fn run(cli: &Cli) -> Result<()> {
    let engine = Arc::new(DockerEngine::new(&cli.docker_config())?);
    engine
        .ping()
        .await
        .with_context(|| format!("Docker Engine at {} is unreachable", engine.endpoint()))?;

    let registry = Arc::new(
        RegistryClient::new(cli.registry_config()).context("Failed to create registry client")?,
    );
    let config = cli.reconciler_config()?;

    let trigger = Trigger::new(config.schedule.clone(), config.poll_interval);
    match &trigger {
        Trigger::Schedule(schedule) => {
            if let Err(e) = schedule.validate() {
                tracing::error!(schedule = %schedule, error = %e, "Schedule is invalid and will never fire");
            } else {
                tracing::info!(schedule = %schedule, "Sweeping on schedule");
            }
        }
        Trigger::Interval(interval) => {
            tracing::info!(interval_secs = interval.as_secs(), "Sweeping at a fixed interval");
        }
    }

    let reconciler = Reconciler::new(config, engine, registry);
    let (shutdown, rx) = watch::channel(false);
    let driver = Driver::new(reconciler, trigger);
    let state = driver.subscribe();
    let driver = tokio::spawn(driver.run(rx));

    shutdown_signal().await?;
    if *state.borrow() == DriverState::Sweeping {
        tracing::info!("Shutdown requested, finishing the current sweep");
    } else {
        tracing::info!("Shutdown requested");
    }
    shutdown.send(true).ok();

    let sweeps = driver.await.context("Driver task failed")?;
    tracing::info!(sweeps, "swarmsync stopped");
    Ok(())
}

/// Waits for Ctrl+C or, on unix, SIGTERM.
async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate =
            signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result.context("Failed to listen for Ctrl+C")?;
                tracing::info!("Received Ctrl+C");
            }
            _ = terminate.recv() => {
                tracing::info!("Received SIGTERM");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for Ctrl+C")?;
        tracing::info!("Received Ctrl+C");
    }

    Ok(())
}
