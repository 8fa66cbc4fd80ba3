use std::time::Duration;

use sqlx::sqlite::SqlitePoolOptions;
use velocita_core::config::DatabaseConfig;

pub type DbPool = sqlx::SqlitePool;

pub async fn connect(database_url: &str) -> Result<DbPool, sqlx::Error> {
    connect_with_settings(database_url, 5, 30).await
}

pub async fn connect_with_config(config: &DatabaseConfig) -> Result<DbPool, sqlx::Error> {
    connect_with_settings(&config.url, config.max_connections, config.timeout_secs).await
}

/// Opens a SQLite pool. File databases are created on first use so that
/// `migrate` can bootstrap an empty deployment.
///
/// An in-memory database lives and dies with its connection, so such pools are
/// pinned to one connection that is never recycled.
pub async fn connect_with_settings(
    database_url: &str,
    max_connections: u32,
    timeout_secs: u64,
) -> Result<DbPool, sqlx::Error> {
    let url = with_create_mode(database_url);
    let in_memory = is_in_memory(database_url);
    let max_connections = if in_memory { 1 } else { max_connections.max(1) };

    let mut options = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(timeout_secs.max(1)));
    if in_memory {
        options = options.idle_timeout(None).max_lifetime(None);
    }

    options
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                sqlx::query("PRAGMA foreign_keys = ON").execute(&mut *conn).await?;
                sqlx::query("PRAGMA journal_mode = WAL").execute(&mut *conn).await?;
                sqlx::query("PRAGMA busy_timeout = 5000").execute(&mut *conn).await?;
                Ok(())
            })
        })
        .connect(&url)
        .await
}

fn is_in_memory(database_url: &str) -> bool {
    database_url.contains(":memory:") || database_url.contains("mode=memory")
}

fn with_create_mode(database_url: &str) -> String {
    let is_file = database_url.starts_with("sqlite://") && !database_url.contains("mode=");
    if !is_file {
        return database_url.to_string();
    }

    let separator = if database_url.contains('?') { '&' } else { '?' };
    format!("{database_url}{separator}mode=rwc")
}

#[cfg(test)]
mod tests {
    use super::{connect_with_settings, is_in_memory, with_create_mode};

    #[test]
    fn file_urls_gain_create_mode() {
        assert_eq!(with_create_mode("sqlite://velocita.db"), "sqlite://velocita.db?mode=rwc");
        assert_eq!(
            with_create_mode("sqlite://velocita.db?cache=shared"),
            "sqlite://velocita.db?cache=shared&mode=rwc"
        );
        assert_eq!(
            with_create_mode("sqlite://velocita.db?mode=ro"),
            "sqlite://velocita.db?mode=ro"
        );
        assert_eq!(with_create_mode("sqlite::memory:"), "sqlite::memory:");
    }

    #[test]
    fn memory_urls_are_detected() {
        assert!(is_in_memory("sqlite::memory:"));
        assert!(is_in_memory("sqlite://shared?mode=memory&cache=shared"));
        assert!(!is_in_memory("sqlite://velocita.db"));
    }

    #[tokio::test]
    async fn in_memory_pool_is_pinned_to_one_connection() {
        let pool = connect_with_settings("sqlite::memory:", 8, 5).await.expect("connect");
        assert_eq!(pool.options().get_max_connections(), 1);
        pool.close().await;
    }

    #[tokio::test]
    async fn in_memory_pool_enforces_foreign_keys() {
        let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("connect");

        let enabled: i64 =
            sqlx::query_scalar("PRAGMA foreign_keys").fetch_one(&pool).await.expect("pragma");
        assert_eq!(enabled, 1);

        pool.close().await;
    }
}
