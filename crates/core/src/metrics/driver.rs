//! Batch recomputation of contact metrics.
//!
//! Each contact is an independent read-score-write unit. Batches fan out over
//! a bounded set of tokio tasks; a failed write is recorded against its
//! contact and the batch carries on. Cancellation is cooperative and is only
//! observed before a contact starts, so a unit either persists in full or is
//! never started.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use super::scoring::{ScoreCalculator, SubScores};
use super::DEFAULT_WORKER_LIMIT;
use crate::domain::contact::{ContactId, ContactMetrics, OwnerId};
use crate::domain::quote::Quote;
use crate::errors::ApplicationError;

/// Storage seam consumed by the driver: quote history in, metrics out.
#[async_trait]
pub trait MetricsStore: Send + Sync {
    async fn owner_exists(&self, owner_id: &OwnerId) -> Result<bool, ApplicationError>;

    async fn list_contact_ids(
        &self,
        scope: &RecomputeScope,
    ) -> Result<Vec<ContactId>, ApplicationError>;

    /// Full quote history of one contact; `NotFound` when the contact is unknown.
    async fn load_quotes(&self, contact_id: &ContactId) -> Result<Vec<Quote>, ApplicationError>;

    async fn save_metrics(
        &self,
        contact_id: &ContactId,
        metrics: &ContactMetrics,
    ) -> Result<(), ApplicationError>;
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "owner_id", rename_all = "snake_case")]
pub enum RecomputeScope {
    All,
    Owner(OwnerId),
}

impl RecomputeScope {
    pub fn from_owner(owner_id: Option<String>) -> Self {
        match owner_id {
            Some(owner_id) => Self::Owner(OwnerId(owner_id)),
            None => Self::All,
        }
    }
}

#[derive(Clone, Debug)]
pub struct BatchOptions {
    pub worker_limit: usize,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self { worker_limit: DEFAULT_WORKER_LIMIT }
    }
}

/// Cloneable stop flag shared between a running batch and whoever may stop it.
#[derive(Clone, Debug, Default)]
pub struct BatchCancellation {
    cancelled: Arc<AtomicBool>,
}

impl BatchCancellation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RecomputeOutcome {
    pub contact_id: ContactId,
    pub metrics: ContactMetrics,
    pub sub_scores: SubScores,
    pub computed_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FailedContact {
    pub contact_id: ContactId,
    pub error: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BatchSummary {
    pub correlation_id: String,
    pub updated_count: usize,
    pub failed: Vec<FailedContact>,
    /// Contacts never started because the batch was cancelled.
    pub skipped_count: usize,
    pub cancelled: bool,
    pub computed_at: DateTime<Utc>,
}

impl BatchSummary {
    pub fn failed_ids(&self) -> Vec<ContactId> {
        self.failed.iter().map(|failure| failure.contact_id.clone()).collect()
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && !self.cancelled
    }
}

pub struct MetricsRecomputeDriver<S> {
    store: Arc<S>,
    calculator: ScoreCalculator,
    options: BatchOptions,
}

impl<S> Clone for MetricsRecomputeDriver<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            calculator: self.calculator.clone(),
            options: self.options.clone(),
        }
    }
}

impl<S> MetricsRecomputeDriver<S>
where
    S: MetricsStore + 'static,
{
    pub fn new(store: Arc<S>, calculator: ScoreCalculator, options: BatchOptions) -> Self {
        Self { store, calculator, options }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Recomputes one contact. Errors reach the caller untouched and nothing
    /// is written unless scoring completed.
    pub async fn recompute_contact(
        &self,
        contact_id: &ContactId,
        now: DateTime<Utc>,
    ) -> Result<RecomputeOutcome, ApplicationError> {
        let outcome = recompute_one(self.store.as_ref(), &self.calculator, contact_id, now).await?;

        info!(
            event_name = "metrics.contact.recomputed",
            correlation_id = "single",
            contact_id = %contact_id,
            value_score = outcome.metrics.value_score,
            "contact metrics recomputed"
        );

        Ok(outcome)
    }

    /// Recomputes every contact in `scope` against the single instant `now`.
    /// Only scope resolution can fail the whole batch.
    pub async fn recompute_batch(
        &self,
        scope: RecomputeScope,
        now: DateTime<Utc>,
        cancellation: &BatchCancellation,
    ) -> Result<BatchSummary, ApplicationError> {
        let correlation_id = Uuid::new_v4().to_string();

        if let RecomputeScope::Owner(owner_id) = &scope {
            if !self.store.owner_exists(owner_id).await? {
                return Err(ApplicationError::not_found("owner", owner_id.0.clone()));
            }
        }

        let contact_ids = self.store.list_contact_ids(&scope).await?;
        let total = contact_ids.len();
        let worker_limit = self.options.worker_limit.max(1);

        info!(
            event_name = "metrics.batch.start",
            correlation_id = %correlation_id,
            contact_count = total,
            worker_limit,
            "starting contact metrics batch"
        );

        let permits = Arc::new(Semaphore::new(worker_limit));
        let mut handles: Vec<(ContactId, JoinHandle<Result<RecomputeOutcome, ApplicationError>>)> =
            Vec::with_capacity(total);
        let mut skipped_count = 0;

        for (index, contact_id) in contact_ids.into_iter().enumerate() {
            let permit = match Arc::clone(&permits).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    skipped_count = total - index;
                    break;
                }
            };

            if cancellation.is_cancelled() {
                skipped_count = total - index;
                break;
            }

            let store = Arc::clone(&self.store);
            let calculator = self.calculator.clone();
            let task_contact_id = contact_id.clone();
            let handle = tokio::spawn(async move {
                let _permit = permit;
                recompute_one(store.as_ref(), &calculator, &task_contact_id, now).await
            });
            handles.push((contact_id, handle));
        }

        let mut updated_count = 0;
        let mut failed = Vec::new();

        for (contact_id, handle) in handles {
            let result = match handle.await {
                Ok(result) => result,
                Err(join_error) => Err(ApplicationError::Persistence(format!(
                    "recompute task aborted: {join_error}"
                ))),
            };

            match result {
                Ok(_) => updated_count += 1,
                Err(error) => {
                    warn!(
                        event_name = "metrics.contact.failed",
                        correlation_id = %correlation_id,
                        contact_id = %contact_id,
                        error = %error,
                        "contact metrics recompute failed; continuing batch"
                    );
                    failed.push(FailedContact { contact_id, error: error.to_string() });
                }
            }
        }

        let cancelled = skipped_count > 0;
        if cancelled {
            info!(
                event_name = "metrics.batch.cancelled",
                correlation_id = %correlation_id,
                skipped_count,
                "contact metrics batch cancelled before completion"
            );
        }

        info!(
            event_name = "metrics.batch.completed",
            correlation_id = %correlation_id,
            updated_count,
            failed_count = failed.len(),
            skipped_count,
            "contact metrics batch finished"
        );

        Ok(BatchSummary {
            correlation_id,
            updated_count,
            failed,
            skipped_count,
            cancelled,
            computed_at: now,
        })
    }
}

async fn recompute_one<S>(
    store: &S,
    calculator: &ScoreCalculator,
    contact_id: &ContactId,
    now: DateTime<Utc>,
) -> Result<RecomputeOutcome, ApplicationError>
where
    S: MetricsStore + ?Sized,
{
    let quotes = store.load_quotes(contact_id).await?;
    let card = calculator.score_quotes(&quotes, now);
    store.save_metrics(contact_id, &card.metrics).await?;

    Ok(RecomputeOutcome {
        contact_id: contact_id.clone(),
        metrics: card.metrics,
        sub_scores: card.sub_scores,
        computed_at: now,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, HashSet};
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use rust_decimal::Decimal;
    use tokio::sync::Mutex;

    use crate::domain::contact::{ContactId, ContactMetrics, OwnerId};
    use crate::domain::quote::{Quote, QuoteId, QuoteStatus};
    use crate::errors::ApplicationError;
    use crate::metrics::ScoreCalculator;

    use super::{
        BatchCancellation, BatchOptions, MetricsRecomputeDriver, MetricsStore, RecomputeScope,
    };

    #[derive(Default)]
    struct FakeStore {
        owners: BTreeMap<String, Vec<String>>,
        quotes: BTreeMap<String, Vec<Quote>>,
        failing_writes: HashSet<String>,
        saved: Mutex<BTreeMap<String, ContactMetrics>>,
        cancel_after_first_save: Option<BatchCancellation>,
    }

    impl FakeStore {
        fn with_contact(mut self, owner: &str, contact: &str, quotes: Vec<Quote>) -> Self {
            self.owners.entry(owner.to_string()).or_default().push(contact.to_string());
            self.quotes.insert(contact.to_string(), quotes);
            self
        }

        fn failing_on(mut self, contact: &str) -> Self {
            self.failing_writes.insert(contact.to_string());
            self
        }

        async fn saved(&self, contact: &str) -> Option<ContactMetrics> {
            self.saved.lock().await.get(contact).cloned()
        }
    }

    #[async_trait]
    impl MetricsStore for FakeStore {
        async fn owner_exists(&self, owner_id: &OwnerId) -> Result<bool, ApplicationError> {
            Ok(self.owners.contains_key(&owner_id.0))
        }

        async fn list_contact_ids(
            &self,
            scope: &RecomputeScope,
        ) -> Result<Vec<ContactId>, ApplicationError> {
            let ids = match scope {
                RecomputeScope::All => self.quotes.keys().cloned().collect::<Vec<_>>(),
                RecomputeScope::Owner(owner) => {
                    self.owners.get(&owner.0).cloned().unwrap_or_default()
                }
            };
            Ok(ids.into_iter().map(ContactId).collect())
        }

        async fn load_quotes(
            &self,
            contact_id: &ContactId,
        ) -> Result<Vec<Quote>, ApplicationError> {
            self.quotes
                .get(&contact_id.0)
                .cloned()
                .ok_or_else(|| ApplicationError::not_found("contact", contact_id.0.clone()))
        }

        async fn save_metrics(
            &self,
            contact_id: &ContactId,
            metrics: &ContactMetrics,
        ) -> Result<(), ApplicationError> {
            if self.failing_writes.contains(&contact_id.0) {
                return Err(ApplicationError::Persistence("disk I/O error".to_string()));
            }
            self.saved.lock().await.insert(contact_id.0.clone(), metrics.clone());
            if let Some(cancellation) = &self.cancel_after_first_save {
                cancellation.cancel();
            }
            Ok(())
        }
    }

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 1, 9, 30, 0).single().expect("valid timestamp")
    }

    fn quote(contact: &str, id: &str, status: QuoteStatus, total: i64) -> Quote {
        let now = fixed_now();
        Quote {
            id: QuoteId(id.to_string()),
            contact_id: ContactId(contact.to_string()),
            number: format!("DEV-{id}"),
            status,
            total: Decimal::new(total, 0),
            accepted_at: (status == QuoteStatus::Accepted).then(|| now - Duration::days(10)),
            created_at: now,
            updated_at: now,
        }
    }

    fn driver(store: FakeStore, worker_limit: usize) -> MetricsRecomputeDriver<FakeStore> {
        MetricsRecomputeDriver::new(
            Arc::new(store),
            ScoreCalculator::new(),
            BatchOptions { worker_limit },
        )
    }

    fn three_contacts() -> FakeStore {
        FakeStore::default()
            .with_contact(
                "owner-a",
                "C-1",
                vec![
                    quote("C-1", "Q-1", QuoteStatus::Accepted, 1200),
                    quote("C-1", "Q-2", QuoteStatus::Refused, 300),
                ],
            )
            .with_contact("owner-a", "C-2", vec![quote("C-2", "Q-3", QuoteStatus::Sent, 800)])
            .with_contact(
                "owner-b",
                "C-3",
                vec![
                    quote("C-3", "Q-4", QuoteStatus::Accepted, 400),
                    quote("C-3", "Q-5", QuoteStatus::Draft, 90),
                ],
            )
    }

    #[tokio::test]
    async fn single_contact_recompute_persists_metrics() {
        let driver = driver(three_contacts(), 2);

        let outcome = driver
            .recompute_contact(&ContactId("C-1".to_string()), fixed_now())
            .await
            .expect("recompute C-1");

        assert_eq!(outcome.metrics.total_revenue, Decimal::new(1200, 0));
        assert_eq!(outcome.metrics.conversion_rate, 50.0);
        assert_eq!(outcome.computed_at, fixed_now());
        assert_eq!(driver.store().saved("C-1").await, Some(outcome.metrics));
    }

    #[tokio::test]
    async fn single_contact_recompute_surfaces_not_found() {
        let driver = driver(three_contacts(), 2);

        let error = driver
            .recompute_contact(&ContactId("C-404".to_string()), fixed_now())
            .await
            .expect_err("unknown contact");

        assert_eq!(error, ApplicationError::not_found("contact", "C-404"));
    }

    #[tokio::test]
    async fn single_contact_write_failure_leaves_nothing_behind() {
        let driver = driver(three_contacts().failing_on("C-2"), 2);

        let error = driver
            .recompute_contact(&ContactId("C-2".to_string()), fixed_now())
            .await
            .expect_err("write fails");

        assert!(matches!(error, ApplicationError::Persistence(_)));
        assert_eq!(driver.store().saved("C-2").await, None);
    }

    #[tokio::test]
    async fn batch_isolates_a_failed_write() {
        let driver = driver(three_contacts().failing_on("C-2"), 3);

        let summary = driver
            .recompute_batch(RecomputeScope::All, fixed_now(), &BatchCancellation::new())
            .await
            .expect("batch completes");

        assert_eq!(summary.updated_count, 2);
        assert_eq!(summary.failed_ids(), vec![ContactId("C-2".to_string())]);
        assert!(summary.failed[0].error.contains("disk I/O error"));
        assert!(!summary.cancelled);
        assert!(!summary.is_clean());

        let c1 = driver.store().saved("C-1").await.expect("C-1 saved");
        assert_eq!(c1.total_revenue, Decimal::new(1200, 0));
        let c3 = driver.store().saved("C-3").await.expect("C-3 saved");
        assert_eq!(c3.total_revenue, Decimal::new(400, 0));
        assert_eq!(c3.conversion_rate, 100.0);
    }

    #[tokio::test]
    async fn batch_scoped_to_owner_only_touches_their_contacts() {
        let driver = driver(three_contacts(), 1);

        let summary = driver
            .recompute_batch(
                RecomputeScope::Owner(OwnerId("owner-b".to_string())),
                fixed_now(),
                &BatchCancellation::new(),
            )
            .await
            .expect("owner batch");

        assert_eq!(summary.updated_count, 1);
        assert!(summary.is_clean());
        assert!(driver.store().saved("C-3").await.is_some());
        assert!(driver.store().saved("C-1").await.is_none());
    }

    #[tokio::test]
    async fn batch_for_unknown_owner_is_not_found() {
        let driver = driver(three_contacts(), 1);

        let error = driver
            .recompute_batch(
                RecomputeScope::Owner(OwnerId("owner-z".to_string())),
                fixed_now(),
                &BatchCancellation::new(),
            )
            .await
            .expect_err("unknown owner");

        assert_eq!(error, ApplicationError::not_found("owner", "owner-z"));
    }

    #[tokio::test]
    async fn repeated_batches_are_idempotent() {
        let driver = driver(three_contacts(), 2);
        let cancellation = BatchCancellation::new();

        driver.recompute_batch(RecomputeScope::All, fixed_now(), &cancellation).await.expect("1st");
        let first = driver.store().saved.lock().await.clone();
        driver.recompute_batch(RecomputeScope::All, fixed_now(), &cancellation).await.expect("2nd");
        let second = driver.store().saved.lock().await.clone();

        assert_eq!(first.len(), 3);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn cancelled_batch_starts_nothing() {
        let driver = driver(three_contacts(), 2);
        let cancellation = BatchCancellation::new();
        cancellation.cancel();

        let summary = driver
            .recompute_batch(RecomputeScope::All, fixed_now(), &cancellation)
            .await
            .expect("cancelled batch still reports");

        assert!(summary.cancelled);
        assert_eq!(summary.updated_count, 0);
        assert_eq!(summary.skipped_count, 3);
        assert!(driver.store().saved.lock().await.is_empty());
    }

    #[tokio::test]
    async fn cancellation_mid_batch_keeps_finished_contacts() {
        let cancellation = BatchCancellation::new();
        let store =
            FakeStore { cancel_after_first_save: Some(cancellation.clone()), ..three_contacts() };
        let driver = driver(store, 1);

        let summary = driver
            .recompute_batch(RecomputeScope::All, fixed_now(), &cancellation)
            .await
            .expect("batch reports");

        assert!(summary.cancelled);
        assert_eq!(summary.updated_count, 1);
        assert_eq!(summary.skipped_count, 2);
        assert_eq!(driver.store().saved.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn empty_scope_reports_zero_updates() {
        let driver = driver(FakeStore::default(), 4);

        let summary = driver
            .recompute_batch(RecomputeScope::All, fixed_now(), &BatchCancellation::new())
            .await
            .expect("empty batch");

        assert_eq!(summary.updated_count, 0);
        assert!(summary.failed.is_empty());
        assert!(summary.is_clean());
    }

    #[test]
    fn scope_from_optional_owner() {
        assert_eq!(RecomputeScope::from_owner(None), RecomputeScope::All);
        assert_eq!(
            RecomputeScope::from_owner(Some("u-1".to_string())),
            RecomputeScope::Owner(OwnerId("u-1".to_string()))
        );
    }
}
