use chrono::{DateTime, Utc};
use sqlx::Row;

use velocita_core::domain::contact::{Contact, ContactId, ContactMetrics, Owner, OwnerId};

use super::{
    parse_decimal, parse_optional_timestamp, parse_timestamp, ContactRepository, RepositoryError,
};
use crate::DbPool;

const CONTACT_COLUMNS: &str = "id, owner_id, name, company, email, total_revenue, conversion_rate,
     average_basket, value_score, last_purchase_at, created_at, updated_at";

pub struct SqlContactRepository {
    pool: DbPool,
}

impl SqlContactRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_contact(row: &sqlx::sqlite::SqliteRow) -> Result<Contact, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let owner_id: String =
        row.try_get("owner_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let name: String = row.try_get("name").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let company: Option<String> =
        row.try_get("company").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let email: Option<String> =
        row.try_get("email").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let total_revenue: String =
        row.try_get("total_revenue").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let conversion_rate: f64 =
        row.try_get("conversion_rate").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let average_basket: String =
        row.try_get("average_basket").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let value_score: f64 =
        row.try_get("value_score").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let last_purchase_at: Option<String> =
        row.try_get("last_purchase_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let updated_at: String =
        row.try_get("updated_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(Contact {
        id: ContactId(id),
        owner_id: OwnerId(owner_id),
        name,
        company,
        email,
        metrics: ContactMetrics {
            total_revenue: parse_decimal("total_revenue", &total_revenue)?,
            conversion_rate,
            average_basket: parse_decimal("average_basket", &average_basket)?,
            value_score,
            last_purchase_at: parse_optional_timestamp("last_purchase_at", last_purchase_at)?,
        },
        created_at: parse_timestamp("created_at", &created_at)?,
        updated_at: parse_timestamp("updated_at", &updated_at)?,
    })
}

#[async_trait::async_trait]
impl ContactRepository for SqlContactRepository {
    async fn find_by_id(&self, id: &ContactId) -> Result<Option<Contact>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {CONTACT_COLUMNS} FROM contact WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_contact(r)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, contact: Contact) -> Result<(), RepositoryError> {
        let metrics = &contact.metrics;

        sqlx::query(
            "INSERT INTO contact (id, owner_id, name, company, email, total_revenue,
                                  conversion_rate, average_basket, value_score,
                                  last_purchase_at, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 owner_id = excluded.owner_id,
                 name = excluded.name,
                 company = excluded.company,
                 email = excluded.email,
                 total_revenue = excluded.total_revenue,
                 conversion_rate = excluded.conversion_rate,
                 average_basket = excluded.average_basket,
                 value_score = excluded.value_score,
                 last_purchase_at = excluded.last_purchase_at,
                 updated_at = excluded.updated_at",
        )
        .bind(&contact.id.0)
        .bind(&contact.owner_id.0)
        .bind(&contact.name)
        .bind(&contact.company)
        .bind(&contact.email)
        .bind(metrics.total_revenue.to_string())
        .bind(metrics.conversion_rate)
        .bind(metrics.average_basket.to_string())
        .bind(metrics.value_score)
        .bind(metrics.last_purchase_at.map(|dt| dt.to_rfc3339()))
        .bind(contact.created_at.to_rfc3339())
        .bind(contact.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_ids(
        &self,
        owner_id: Option<&OwnerId>,
    ) -> Result<Vec<ContactId>, RepositoryError> {
        let ids: Vec<String> = if let Some(owner_id) = owner_id {
            sqlx::query_scalar("SELECT id FROM contact WHERE owner_id = ? ORDER BY id ASC")
                .bind(&owner_id.0)
                .fetch_all(&self.pool)
                .await?
        } else {
            sqlx::query_scalar("SELECT id FROM contact ORDER BY id ASC")
                .fetch_all(&self.pool)
                .await?
        };

        Ok(ids.into_iter().map(ContactId).collect())
    }

    async fn update_metrics(
        &self,
        id: &ContactId,
        metrics: &ContactMetrics,
        computed_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE contact SET
                 total_revenue = ?,
                 conversion_rate = ?,
                 average_basket = ?,
                 value_score = ?,
                 last_purchase_at = ?,
                 metrics_updated_at = ?
             WHERE id = ?",
        )
        .bind(metrics.total_revenue.to_string())
        .bind(metrics.conversion_rate)
        .bind(metrics.average_basket.to_string())
        .bind(metrics.value_score)
        .bind(metrics.last_purchase_at.map(|dt| dt.to_rfc3339()))
        .bind(computed_at.to_rfc3339())
        .bind(&id.0)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound { entity: "contact", id: id.0.clone() });
        }
        Ok(())
    }

    async fn save_owner(&self, owner: Owner) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO app_user (id, email, display_name, created_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 email = excluded.email,
                 display_name = excluded.display_name",
        )
        .bind(&owner.id.0)
        .bind(&owner.email)
        .bind(&owner.display_name)
        .bind(owner.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn owner_exists(&self, id: &OwnerId) -> Result<bool, RepositoryError> {
        let exists: i64 = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM app_user WHERE id = ?)")
            .bind(&id.0)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists == 1)
    }
}
