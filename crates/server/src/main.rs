mod bootstrap;
mod health;
mod http;
mod metrics_api;
mod scheduler;

use std::time::Duration;

use anyhow::Result;
use tokio::sync::watch;
use velocita_core::config::{AppConfig, LoadOptions};
use velocita_core::metrics::BatchCancellation;

fn init_logging(config: &AppConfig) {
    use tracing::Level;
    use velocita_core::config::LogFormat::*;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let cancellation = BatchCancellation::new();

    let server = http::spawn(
        &app.config.server.bind_address,
        app.config.server.port,
        http::router(&app),
        shutdown_rx.clone(),
    )
    .await?;
    let schedule = scheduler::spawn(
        app.driver.clone(),
        app.config.metrics.batch_interval_secs,
        cancellation.clone(),
        shutdown_rx,
    );

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        "velocita-server started"
    );
    wait_for_shutdown().await?;
    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "velocita-server stopping"
    );

    cancellation.cancel();
    let _ = shutdown_tx.send(true);

    let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    let drained = async {
        let _ = server.await;
        if let Some(schedule) = schedule {
            let _ = schedule.await;
        }
    };
    if tokio::time::timeout(grace, drained).await.is_err() {
        tracing::warn!(
            event_name = "system.server.shutdown_timeout",
            correlation_id = "shutdown",
            grace_secs = app.config.server.graceful_shutdown_secs,
            "in-flight work did not drain before the shutdown deadline"
        );
    }

    app.db_pool.close().await;
    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
