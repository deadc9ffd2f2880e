//! Harness entry point: wire config, results log, metrics server and runner
//! together and run until interrupted.

use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use hypercorescale::config::{Config, ExperimentDefinitions};
use hypercorescale::experiment::ExperimentRegistry;
use hypercorescale::metrics::{MetricsCollector, MetricsServer};
use hypercorescale::results::ResultsLog;
use hypercorescale::runner::{Runner, RunnerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = Config::from_env()?;
    tokio::fs::create_dir_all(&config.storage_path)
        .await
        .with_context(|| format!("creating {}", config.storage_path.display()))?;

    let defs = ExperimentDefinitions::load(&config.experiments_file)?;
    let registry = Arc::new(ExperimentRegistry::from_definitions(&defs)?);
    let results = Arc::new(ResultsLog::open(config.results_path()).await?);

    let collector = Arc::new(MetricsCollector::new(registry.clone(), results.clone()));
    let server = MetricsServer::bind(&config.metrics_host, config.metrics_port, collector).await?;
    info!("Server listening at http://{}", server.local_addr());

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let server_task = tokio::spawn(server.serve(async move {
        let _ = shutdown_rx.await;
    }));

    let runner = Runner::spawn(
        registry,
        results.clone(),
        RunnerConfig {
            interval: config.test_interval,
            timeout: config.test_timeout,
            scratch_root: config.scratch_path(),
        },
    )
    .await?;
    info!("Fully setup");

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;

    info!("Closing runner");
    runner.close().await?;

    info!("Closing server");
    let _ = shutdown_tx.send(());
    server_task.await.context("joining server task")??;

    results.close().await?;
    info!("Shut down successfully");
    Ok(())
}
