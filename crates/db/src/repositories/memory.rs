use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use velocita_core::domain::contact::{Contact, ContactId, ContactMetrics, Owner, OwnerId};
use velocita_core::domain::quote::{Quote, QuoteId};

use super::{ContactRepository, QuoteRepository, RepositoryError};

#[derive(Default)]
pub struct InMemoryContactRepository {
    contacts: RwLock<BTreeMap<String, Contact>>,
    owners: RwLock<HashMap<String, Owner>>,
}

#[async_trait::async_trait]
impl ContactRepository for InMemoryContactRepository {
    async fn find_by_id(&self, id: &ContactId) -> Result<Option<Contact>, RepositoryError> {
        let contacts = self.contacts.read().await;
        Ok(contacts.get(&id.0).cloned())
    }

    async fn save(&self, contact: Contact) -> Result<(), RepositoryError> {
        let mut contacts = self.contacts.write().await;
        contacts.insert(contact.id.0.clone(), contact);
        Ok(())
    }

    async fn list_ids(
        &self,
        owner_id: Option<&OwnerId>,
    ) -> Result<Vec<ContactId>, RepositoryError> {
        let contacts = self.contacts.read().await;
        Ok(contacts
            .values()
            .filter(|contact| owner_id.map_or(true, |owner| &contact.owner_id == owner))
            .map(|contact| contact.id.clone())
            .collect())
    }

    async fn update_metrics(
        &self,
        id: &ContactId,
        metrics: &ContactMetrics,
        _computed_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let mut contacts = self.contacts.write().await;
        let contact = contacts
            .get_mut(&id.0)
            .ok_or_else(|| RepositoryError::NotFound { entity: "contact", id: id.0.clone() })?;
        contact.metrics = metrics.clone();
        Ok(())
    }

    async fn save_owner(&self, owner: Owner) -> Result<(), RepositoryError> {
        let mut owners = self.owners.write().await;
        owners.insert(owner.id.0.clone(), owner);
        Ok(())
    }

    async fn owner_exists(&self, id: &OwnerId) -> Result<bool, RepositoryError> {
        let owners = self.owners.read().await;
        Ok(owners.contains_key(&id.0))
    }
}

#[derive(Default)]
pub struct InMemoryQuoteRepository {
    quotes: RwLock<HashMap<String, Quote>>,
}

#[async_trait::async_trait]
impl QuoteRepository for InMemoryQuoteRepository {
    async fn find_by_id(&self, id: &QuoteId) -> Result<Option<Quote>, RepositoryError> {
        let quotes = self.quotes.read().await;
        Ok(quotes.get(&id.0).cloned())
    }

    async fn save(&self, quote: Quote) -> Result<(), RepositoryError> {
        let mut quotes = self.quotes.write().await;
        quotes.insert(quote.id.0.clone(), quote);
        Ok(())
    }

    async fn list_for_contact(
        &self,
        contact_id: &ContactId,
    ) -> Result<Vec<Quote>, RepositoryError> {
        let quotes = self.quotes.read().await;
        let mut history = quotes
            .values()
            .filter(|quote| &quote.contact_id == contact_id)
            .cloned()
            .collect::<Vec<_>>();
        history.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.0.cmp(&b.id.0)));
        Ok(history)
    }
}
