use async_trait::async_trait;
use chrono::Utc;

use velocita_core::domain::contact::{ContactId, ContactMetrics, OwnerId};
use velocita_core::domain::quote::Quote;
use velocita_core::errors::ApplicationError;
use velocita_core::metrics::{MetricsStore, RecomputeScope};

use crate::repositories::{
    ContactRepository, InMemoryContactRepository, InMemoryQuoteRepository, QuoteRepository,
    SqlContactRepository, SqlQuoteRepository,
};
use crate::DbPool;

/// Backs the recompute driver with a contact and a quote repository.
pub struct RepositoryMetricsStore<C, Q> {
    contacts: C,
    quotes: Q,
}

pub type SqlMetricsStore = RepositoryMetricsStore<SqlContactRepository, SqlQuoteRepository>;
pub type InMemoryMetricsStore =
    RepositoryMetricsStore<InMemoryContactRepository, InMemoryQuoteRepository>;

impl<C, Q> RepositoryMetricsStore<C, Q> {
    pub fn new(contacts: C, quotes: Q) -> Self {
        Self { contacts, quotes }
    }

    pub fn contacts(&self) -> &C {
        &self.contacts
    }

    pub fn quotes(&self) -> &Q {
        &self.quotes
    }
}

impl SqlMetricsStore {
    pub fn from_pool(pool: DbPool) -> Self {
        Self::new(SqlContactRepository::new(pool.clone()), SqlQuoteRepository::new(pool))
    }
}

#[async_trait]
impl<C, Q> MetricsStore for RepositoryMetricsStore<C, Q>
where
    C: ContactRepository,
    Q: QuoteRepository,
{
    async fn owner_exists(&self, owner_id: &OwnerId) -> Result<bool, ApplicationError> {
        Ok(self.contacts.owner_exists(owner_id).await?)
    }

    async fn list_contact_ids(
        &self,
        scope: &RecomputeScope,
    ) -> Result<Vec<ContactId>, ApplicationError> {
        let owner_id = match scope {
            RecomputeScope::All => None,
            RecomputeScope::Owner(owner_id) => Some(owner_id),
        };
        Ok(self.contacts.list_ids(owner_id).await?)
    }

    async fn load_quotes(&self, contact_id: &ContactId) -> Result<Vec<Quote>, ApplicationError> {
        if self.contacts.find_by_id(contact_id).await?.is_none() {
            return Err(ApplicationError::not_found("contact", contact_id.0.clone()));
        }
        Ok(self.quotes.list_for_contact(contact_id).await?)
    }

    async fn save_metrics(
        &self,
        contact_id: &ContactId,
        metrics: &ContactMetrics,
    ) -> Result<(), ApplicationError> {
        Ok(self.contacts.update_metrics(contact_id, metrics, Utc::now()).await?)
    }
}
