use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use velocita_core::domain::contact::{Contact, ContactId, ContactMetrics, Owner, OwnerId};
use velocita_core::domain::quote::{Quote, QuoteId};
use velocita_core::errors::ApplicationError;

pub mod contact;
pub mod memory;
pub mod quote;

pub use contact::SqlContactRepository;
pub use memory::{InMemoryContactRepository, InMemoryQuoteRepository};
pub use quote::SqlQuoteRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("{entity} `{id}` was not found")]
    NotFound { entity: &'static str, id: String },
}

impl From<RepositoryError> for ApplicationError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::NotFound { entity, id } => ApplicationError::NotFound { entity, id },
            other => ApplicationError::Persistence(other.to_string()),
        }
    }
}

#[async_trait]
pub trait ContactRepository: Send + Sync {
    async fn find_by_id(&self, id: &ContactId) -> Result<Option<Contact>, RepositoryError>;
    async fn save(&self, contact: Contact) -> Result<(), RepositoryError>;

    /// Ids in stable order, optionally restricted to one owner.
    async fn list_ids(&self, owner_id: Option<&OwnerId>)
        -> Result<Vec<ContactId>, RepositoryError>;

    /// Overwrites the stored metrics wholesale; `NotFound` when the contact is gone.
    async fn update_metrics(
        &self,
        id: &ContactId,
        metrics: &ContactMetrics,
        computed_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;

    async fn save_owner(&self, owner: Owner) -> Result<(), RepositoryError>;
    async fn owner_exists(&self, id: &OwnerId) -> Result<bool, RepositoryError>;
}

#[async_trait]
pub trait QuoteRepository: Send + Sync {
    async fn find_by_id(&self, id: &QuoteId) -> Result<Option<Quote>, RepositoryError>;
    async fn save(&self, quote: Quote) -> Result<(), RepositoryError>;
    async fn list_for_contact(&self, contact_id: &ContactId)
        -> Result<Vec<Quote>, RepositoryError>;
}

fn parse_timestamp(column: &str, value: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("{column}: {e}")))
}

fn parse_optional_timestamp(
    column: &str,
    value: Option<String>,
) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    value.map(|raw| parse_timestamp(column, &raw)).transpose()
}

fn parse_decimal(column: &str, value: &str) -> Result<rust_decimal::Decimal, RepositoryError> {
    value.parse().map_err(|e| RepositoryError::Decode(format!("{column}: {e}")))
}
