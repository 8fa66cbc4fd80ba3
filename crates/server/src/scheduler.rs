//! Periodic full recompute, so recency decays even for contacts whose quotes
//! never change.

use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{info, warn};
use velocita_core::metrics::{BatchCancellation, RecomputeScope};

use crate::bootstrap::Driver;

/// Returns `None` when `interval_secs` is zero.
pub fn spawn(
    driver: Driver,
    interval_secs: u64,
    cancellation: BatchCancellation,
    shutdown: watch::Receiver<bool>,
) -> Option<JoinHandle<()>> {
    if interval_secs == 0 {
        info!(
            event_name = "metrics.schedule.disabled",
            correlation_id = "bootstrap",
            "periodic metrics batch disabled"
        );
        return None;
    }

    info!(
        event_name = "metrics.schedule.start",
        correlation_id = "bootstrap",
        interval_secs,
        "periodic metrics batch scheduled"
    );
    Some(tokio::spawn(run(driver, Duration::from_secs(interval_secs), cancellation, shutdown)))
}

async fn run(
    driver: Driver,
    period: Duration,
    cancellation: BatchCancellation,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.wait_for(|stopping| *stopping) => break,
        }
        if cancellation.is_cancelled() {
            break;
        }

        match driver.recompute_batch(RecomputeScope::All, Utc::now(), &cancellation).await {
            Ok(summary) if summary.is_clean() => {}
            Ok(summary) => warn!(
                event_name = "metrics.schedule.incomplete",
                correlation_id = %summary.correlation_id,
                failed_count = summary.failed.len(),
                skipped_count = summary.skipped_count,
                "periodic metrics batch did not update every contact"
            ),
            Err(error) => warn!(
                event_name = "metrics.schedule.failed",
                correlation_id = "schedule",
                error = %error,
                "periodic metrics batch could not start"
            ),
        }
    }

    info!(
        event_name = "metrics.schedule.stopped",
        correlation_id = "shutdown",
        "periodic metrics batch stopped"
    );
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use rust_decimal::Decimal;
    use tokio::sync::watch;
    use velocita_core::domain::contact::ContactId;
    use velocita_core::metrics::{
        BatchCancellation, BatchOptions, MetricsRecomputeDriver, ScoreCalculator,
    };
    use velocita_db::repositories::ContactRepository;
    use velocita_db::{connect_with_settings, migrations, DemoSeedDataset, SqlMetricsStore};

    use super::{run, spawn};
    use crate::bootstrap::Driver;

    async fn seeded_driver() -> Driver {
        let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        DemoSeedDataset::load(&pool).await.expect("seed");

        MetricsRecomputeDriver::new(
            Arc::new(SqlMetricsStore::from_pool(pool)),
            ScoreCalculator::new(),
            BatchOptions::default(),
        )
    }

    #[tokio::test]
    async fn zero_interval_disables_the_job() {
        let (_tx, rx) = watch::channel(false);
        let handle = spawn(seeded_driver().await, 0, BatchCancellation::new(), rx);
        assert!(handle.is_none());
    }

    #[tokio::test]
    async fn ticks_recompute_until_shutdown() {
        let driver = seeded_driver().await;
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(run(
            driver.clone(),
            Duration::from_millis(20),
            BatchCancellation::new(),
            rx,
        ));

        let contact_id = ContactId("ct-demo-loyal".to_string());
        let mut refreshed = false;
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(20)).await;
            let contact = driver
                .store()
                .contacts()
                .find_by_id(&contact_id)
                .await
                .expect("read contact")
                .expect("contact exists");
            if contact.metrics.total_revenue == Decimal::new(350_000, 2) {
                refreshed = true;
                break;
            }
        }
        assert!(refreshed, "periodic batch should have refreshed stored metrics");

        tx.send(true).expect("scheduler is listening");
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("scheduler should stop on shutdown")
            .expect("scheduler task should not panic");
    }
}
