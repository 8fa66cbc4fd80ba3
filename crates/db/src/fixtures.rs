use sqlx::Executor;

use crate::connection::DbPool;
use crate::repositories::RepositoryError;

const SEED_OWNER_IDS: &[&str] = &["usr-alice", "usr-bruno"];

/// Expected shape of each demo contact after loading.
const SEED_CONTACTS: &[SeedContactContract] = &[
    SeedContactContract {
        contact_id: "ct-demo-fresh",
        owner_id: "usr-alice",
        quote_count: 0,
        accepted_count: 0,
        sent_count: 0,
        description: "New lead, no quotes yet",
    },
    SeedContactContract {
        contact_id: "ct-demo-active",
        owner_id: "usr-alice",
        quote_count: 3,
        accepted_count: 1,
        sent_count: 3,
        description: "Prospect with one of three sent quotes accepted",
    },
    SeedContactContract {
        contact_id: "ct-demo-loyal",
        owner_id: "usr-bruno",
        quote_count: 6,
        accepted_count: 3,
        sent_count: 4,
        description: "Repeat client with a refusal, a draft and a closed deal",
    },
    SeedContactContract {
        contact_id: "ct-demo-dormant",
        owner_id: "usr-bruno",
        quote_count: 2,
        accepted_count: 1,
        sent_count: 2,
        description: "Client whose only purchase is two years old",
    },
];

/// Demo owners, contacts and quotes for local runs and smoke tests.
pub struct DemoSeedDataset;

impl DemoSeedDataset {
    pub const SQL: &str = include_str!("../../../config/fixtures/demo_seed_data.sql");

    /// Loads the dataset; rows that already exist are left as they are.
    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;

        tx.execute(sqlx::query(Self::SQL)).await?;
        tx.commit().await?;

        let contacts_seeded = SEED_CONTACTS
            .iter()
            .map(|contact| SeededContact {
                contact_id: contact.contact_id,
                owner_id: contact.owner_id,
                description: contact.description,
            })
            .collect::<Vec<_>>();

        Ok(SeedResult { owners_seeded: SEED_OWNER_IDS.len(), contacts_seeded })
    }

    /// Checks that every seeded row is present and matches the contract.
    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        let quoted_owners = sql_array_from_ids(SEED_OWNER_IDS);
        let owner_count: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(1) FROM app_user WHERE id IN {quoted_owners}"
        ))
        .fetch_one(pool)
        .await?;
        checks.push(("owners", owner_count == SEED_OWNER_IDS.len() as i64));

        for contact in SEED_CONTACTS {
            let contact_ok: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM contact WHERE id = ?1 AND owner_id = ?2)",
            )
            .bind(contact.contact_id)
            .bind(contact.owner_id)
            .fetch_one(pool)
            .await?;
            checks.push((contact.contact_id, contact_ok == 1));

            let quote_count: i64 =
                sqlx::query_scalar("SELECT COUNT(1) FROM quote WHERE contact_id = ?1")
                    .bind(contact.contact_id)
                    .fetch_one(pool)
                    .await?;
            checks.push((contact.quote_count_label(), quote_count == contact.quote_count));

            let accepted_count: i64 = sqlx::query_scalar(
                "SELECT COUNT(1) FROM quote WHERE contact_id = ?1 AND status = 'ACCEPTED'",
            )
            .bind(contact.contact_id)
            .fetch_one(pool)
            .await?;
            checks.push((contact.accepted_count_label(), accepted_count == contact.accepted_count));

            let sent_count: i64 = sqlx::query_scalar(
                "SELECT COUNT(1) FROM quote WHERE contact_id = ?1
                 AND status IN ('SENT', 'VIEWED', 'ACCEPTED', 'REFUSED', 'EXPIRED')",
            )
            .bind(contact.contact_id)
            .fetch_one(pool)
            .await?;
            checks.push((contact.sent_count_label(), sent_count == contact.sent_count));
        }

        let accepted_without_stamp: i64 = sqlx::query_scalar(
            "SELECT COUNT(1) FROM quote WHERE status = 'ACCEPTED' AND accepted_at IS NULL",
        )
        .fetch_one(pool)
        .await?;
        checks.push(("accepted-quotes-stamped", accepted_without_stamp == 0));

        let all_present = checks.iter().all(|(_, ok)| *ok);
        Ok(VerificationResult { all_present, checks })
    }

    /// Removes the demo rows; quotes and contacts go with their owners.
    pub async fn clean(pool: &DbPool) -> Result<(), RepositoryError> {
        let mut tx = pool.begin().await?;

        let quoted_contacts = sql_array_from_ids(
            &SEED_CONTACTS.iter().map(|contact| contact.contact_id).collect::<Vec<_>>(),
        );
        let quoted_owners = sql_array_from_ids(SEED_OWNER_IDS);

        sqlx::query(&format!("DELETE FROM quote WHERE contact_id IN {quoted_contacts}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("DELETE FROM contact WHERE id IN {quoted_contacts}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("DELETE FROM app_user WHERE id IN {quoted_owners}"))
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct SeedContactContract {
    contact_id: &'static str,
    owner_id: &'static str,
    quote_count: i64,
    accepted_count: i64,
    sent_count: i64,
    description: &'static str,
}

impl SeedContactContract {
    fn quote_count_label(&self) -> &'static str {
        match self.contact_id {
            "ct-demo-fresh" => "fresh-quote-count",
            "ct-demo-active" => "active-quote-count",
            "ct-demo-loyal" => "loyal-quote-count",
            _ => "dormant-quote-count",
        }
    }

    fn accepted_count_label(&self) -> &'static str {
        match self.contact_id {
            "ct-demo-fresh" => "fresh-accepted-count",
            "ct-demo-active" => "active-accepted-count",
            "ct-demo-loyal" => "loyal-accepted-count",
            _ => "dormant-accepted-count",
        }
    }

    fn sent_count_label(&self) -> &'static str {
        match self.contact_id {
            "ct-demo-fresh" => "fresh-sent-count",
            "ct-demo-active" => "active-sent-count",
            "ct-demo-loyal" => "loyal-sent-count",
            _ => "dormant-sent-count",
        }
    }
}

fn sql_array_from_ids(ids: &[&str]) -> String {
    let quoted = ids.iter().map(|id| format!("'{}'", id)).collect::<Vec<_>>().join(",");
    format!("({quoted})")
}

#[derive(Debug)]
pub struct SeedResult {
    pub owners_seeded: usize,
    pub contacts_seeded: Vec<SeededContact>,
}

#[derive(Debug)]
pub struct SeededContact {
    pub contact_id: &'static str,
    pub owner_id: &'static str,
    pub description: &'static str,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}
