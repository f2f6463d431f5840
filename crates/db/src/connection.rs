use std::time::Duration;

use sqlx::sqlite::SqlitePoolOptions;
use wardstock_core::config::DatabaseConfig;

pub type DbPool = sqlx::SqlitePool;

/// Open a pool for the configured database. `busy_timeout` tracks the
/// configured acquire timeout so a locked database gives up in step with
/// pool acquisition instead of at an unrelated cutoff.
pub async fn connect(database: &DatabaseConfig) -> Result<DbPool, sqlx::Error> {
    let timeout = Duration::from_secs(database.timeout_secs.max(1));
    let busy_timeout_pragma = format!("PRAGMA busy_timeout = {}", timeout.as_millis());

    SqlitePoolOptions::new()
        .max_connections(database.max_connections.max(1))
        .acquire_timeout(timeout)
        .after_connect(move |conn, _meta| {
            let busy_timeout_pragma = busy_timeout_pragma.clone();
            Box::pin(async move {
                sqlx::query("PRAGMA foreign_keys = ON").execute(&mut *conn).await?;
                sqlx::query("PRAGMA journal_mode = WAL").execute(&mut *conn).await?;
                sqlx::query(&busy_timeout_pragma).execute(&mut *conn).await?;
                Ok(())
            })
        })
        .connect(&database.url)
        .await
}

#[cfg(test)]
mod tests {
    use sqlx::Row;
    use wardstock_core::config::DatabaseConfig;

    use super::connect;

    #[tokio::test]
    async fn busy_timeout_follows_the_configured_acquire_timeout() {
        let database = DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            timeout_secs: 7,
        };
        let pool = connect(&database).await.expect("connect");

        let row = sqlx::query("PRAGMA busy_timeout").fetch_one(&pool).await.expect("pragma");
        let timeout_ms: i64 = row.try_get(0).expect("timeout value");
        assert_eq!(timeout_ms, 7_000);
    }

    #[tokio::test]
    async fn foreign_keys_are_enforced_on_every_connection() {
        let pool =
            connect(&DatabaseConfig::single_connection("sqlite::memory:")).await.expect("connect");

        let row = sqlx::query("PRAGMA foreign_keys").fetch_one(&pool).await.expect("pragma");
        let enabled: i64 = row.try_get(0).expect("flag value");
        assert_eq!(enabled, 1);
    }
}
