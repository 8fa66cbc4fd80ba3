use sqlx::Row;

use velocita_core::domain::contact::ContactId;
use velocita_core::domain::quote::{Quote, QuoteId, QuoteStatus};

use super::{
    parse_decimal, parse_optional_timestamp, parse_timestamp, QuoteRepository, RepositoryError,
};
use crate::DbPool;

pub struct SqlQuoteRepository {
    pool: DbPool,
}

impl SqlQuoteRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_quote(row: &sqlx::sqlite::SqliteRow) -> Result<Quote, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let contact_id: String =
        row.try_get("contact_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let number: String =
        row.try_get("number").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let status: String =
        row.try_get("status").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let total: String = row.try_get("total").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let accepted_at: Option<String> =
        row.try_get("accepted_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let updated_at: String =
        row.try_get("updated_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let status = status
        .parse::<QuoteStatus>()
        .map_err(|e| RepositoryError::Decode(format!("status: {e}")))?;

    Ok(Quote {
        id: QuoteId(id),
        contact_id: ContactId(contact_id),
        number,
        status,
        total: parse_decimal("total", &total)?,
        accepted_at: parse_optional_timestamp("accepted_at", accepted_at)?,
        created_at: parse_timestamp("created_at", &created_at)?,
        updated_at: parse_timestamp("updated_at", &updated_at)?,
    })
}

#[async_trait::async_trait]
impl QuoteRepository for SqlQuoteRepository {
    async fn find_by_id(&self, id: &QuoteId) -> Result<Option<Quote>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, contact_id, number, status, total, accepted_at, created_at, updated_at
             FROM quote WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_quote(r)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, quote: Quote) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO quote (id, contact_id, number, status, total, accepted_at,
                                created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 contact_id = excluded.contact_id,
                 number = excluded.number,
                 status = excluded.status,
                 total = excluded.total,
                 accepted_at = excluded.accepted_at,
                 updated_at = excluded.updated_at",
        )
        .bind(&quote.id.0)
        .bind(&quote.contact_id.0)
        .bind(&quote.number)
        .bind(quote.status.as_str())
        .bind(quote.total.to_string())
        .bind(quote.accepted_at.map(|dt| dt.to_rfc3339()))
        .bind(quote.created_at.to_rfc3339())
        .bind(quote.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_for_contact(
        &self,
        contact_id: &ContactId,
    ) -> Result<Vec<Quote>, RepositoryError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(
            "SELECT id, contact_id, number, status, total, accepted_at, created_at, updated_at
             FROM quote WHERE contact_id = ? ORDER BY created_at ASC, id ASC",
        )
        .bind(&contact_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_quote).collect::<Result<Vec<_>, _>>()
    }
}
