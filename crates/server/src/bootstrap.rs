use std::sync::Arc;

use thiserror::Error;
use tracing::info;
use velocita_core::config::{AppConfig, ConfigError};
use velocita_core::metrics::{MetricsRecomputeDriver, ScoreCalculator};
use velocita_db::{connect_with_config, migrations, DbPool, SqlMetricsStore};

pub type Driver = MetricsRecomputeDriver<SqlMetricsStore>;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub driver: Driver,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool =
        connect_with_config(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let driver = MetricsRecomputeDriver::new(
        Arc::new(SqlMetricsStore::from_pool(db_pool.clone())),
        ScoreCalculator::with_policy(config.metrics.scoring_policy()),
        config.metrics.batch_options(),
    );

    Ok(Application { config, db_pool, driver })
}
