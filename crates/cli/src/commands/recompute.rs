use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use velocita_core::domain::contact::ContactId;
use velocita_core::errors::ApplicationError;
use velocita_core::metrics::{
    BatchCancellation, BatchSummary, MetricsRecomputeDriver, RecomputeScope, ScoreCalculator,
};
use velocita_db::{connect_with_config, SqlMetricsStore};

use crate::commands::{
    build_runtime, load_config, CommandResult, EXIT_COMMAND_FAILED, EXIT_CONFIG,
    EXIT_DB_CONNECTIVITY, EXIT_NOT_FOUND,
};

/// `--contact` recomputes one contact and surfaces its error; otherwise a batch
/// runs over `--owner`'s contacts or everyone. Ctrl-C stops the batch between contacts.
pub fn run(contact: Option<String>, owner: Option<String>) -> CommandResult {
    let config = match load_config("recompute") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match build_runtime("recompute") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    runtime.block_on(async {
        let pool = match connect_with_config(&config.database).await {
            Ok(pool) => pool,
            Err(error) => {
                return CommandResult::failure(
                    "recompute",
                    "db_connectivity",
                    error.to_string(),
                    EXIT_DB_CONNECTIVITY,
                );
            }
        };

        let driver = MetricsRecomputeDriver::new(
            Arc::new(SqlMetricsStore::from_pool(pool.clone())),
            ScoreCalculator::with_policy(config.metrics.scoring_policy()),
            config.metrics.batch_options(),
        );

        let result = match contact {
            Some(contact_id) => recompute_contact(&driver, ContactId(contact_id)).await,
            None => recompute_batch(&driver, RecomputeScope::from_owner(owner)).await,
        };

        pool.close().await;
        result
    })
}

async fn recompute_contact(
    driver: &MetricsRecomputeDriver<SqlMetricsStore>,
    contact_id: ContactId,
) -> CommandResult {
    match driver.recompute_contact(&contact_id, Utc::now()).await {
        Ok(outcome) => CommandResult::success_with_details(
            "recompute",
            format!(
                "recomputed contact {}: value score {}",
                contact_id, outcome.metrics.value_score
            ),
            serde_json::to_value(&outcome).ok(),
        ),
        Err(error) => application_failure(&error),
    }
}

async fn recompute_batch(
    driver: &MetricsRecomputeDriver<SqlMetricsStore>,
    scope: RecomputeScope,
) -> CommandResult {
    let cancellation = BatchCancellation::new();
    let interrupt = {
        let cancellation = cancellation.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancellation.cancel();
            }
        })
    };

    let result = driver.recompute_batch(scope, Utc::now(), &cancellation).await;
    interrupt.abort();

    match result {
        Ok(summary) => summarize_batch(&summary),
        Err(error) => application_failure(&error),
    }
}

fn summarize_batch(summary: &BatchSummary) -> CommandResult {
    let failed_ids =
        summary.failed_ids().into_iter().map(|contact_id| contact_id.0).collect::<Vec<_>>();
    let details = json!({
        "correlation_id": summary.correlation_id,
        "updated_count": summary.updated_count,
        "failed_ids": failed_ids,
        "skipped_count": summary.skipped_count,
        "cancelled": summary.cancelled,
    });

    if summary.cancelled {
        return CommandResult::failure_with_details(
            "recompute",
            "recompute_cancelled",
            format!(
                "batch cancelled after {} contacts; {} not started",
                summary.updated_count + summary.failed.len(),
                summary.skipped_count
            ),
            EXIT_COMMAND_FAILED,
            Some(details),
        );
    }

    if !summary.failed.is_empty() {
        return CommandResult::failure_with_details(
            "recompute",
            "recompute_partial",
            format!(
                "recomputed {} contacts; {} failed: {}",
                summary.updated_count,
                failed_ids.len(),
                failed_ids.join(", ")
            ),
            EXIT_COMMAND_FAILED,
            Some(details),
        );
    }

    CommandResult::success_with_details(
        "recompute",
        format!("recomputed {} contacts", summary.updated_count),
        Some(details),
    )
}

fn application_failure(error: &ApplicationError) -> CommandResult {
    let (error_class, exit_code) = match error {
        ApplicationError::NotFound { .. } => ("not_found", EXIT_NOT_FOUND),
        ApplicationError::Persistence(_) => ("persistence", EXIT_COMMAND_FAILED),
        ApplicationError::Domain(_) => ("domain", EXIT_COMMAND_FAILED),
        ApplicationError::Configuration(_) => ("config_validation", EXIT_CONFIG),
    };
    CommandResult::failure("recompute", error_class, error.to_string(), exit_code)
}
