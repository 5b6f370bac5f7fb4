//! SQLite pool construction for the workflow stores.

use std::time::Duration;

use sqlx::sqlite::SqlitePoolOptions;

pub type DbPool = sqlx::SqlitePool;

/// Builds a pool sized from `DatabaseConfig`, applying assetflow's session
/// pragmas to every connection: foreign keys on, WAL journaling, and a 5s
/// busy timeout so concurrent writers queue instead of failing fast.
///
/// Pool size and acquire timeout are clamped to at least 1 so a zeroed
/// config cannot produce a pool that never hands out a connection.
pub async fn connect_with_settings(
    database_url: &str,
    max_connections: u32,
    timeout_secs: u64,
) -> Result<DbPool, sqlx::Error> {
    SqlitePoolOptions::new()
        .max_connections(max_connections.max(1))
        .acquire_timeout(Duration::from_secs(timeout_secs.max(1)))
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                sqlx::query("PRAGMA foreign_keys = ON").execute(&mut *conn).await?;
                sqlx::query("PRAGMA journal_mode = WAL").execute(&mut *conn).await?;
                sqlx::query("PRAGMA busy_timeout = 5000").execute(&mut *conn).await?;
                Ok(())
            })
        })
        .connect(database_url)
        .await
}

#[cfg(test)]
mod tests {
    use sqlx::Row;

    use super::connect_with_settings;

    async fn pragma_value(pool: &super::DbPool, pragma: &str) -> i64 {
        sqlx::query(pragma)
            .fetch_one(pool)
            .await
            .expect("pragma query")
            .try_get(0)
            .expect("pragma value")
    }

    #[tokio::test]
    async fn sessions_carry_the_workflow_pragmas() {
        let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("connect");

        assert_eq!(pragma_value(&pool, "PRAGMA foreign_keys").await, 1);
        assert_eq!(pragma_value(&pool, "PRAGMA busy_timeout").await, 5000);
    }

    #[tokio::test]
    async fn zeroed_settings_are_clamped_to_a_usable_pool() {
        let pool = connect_with_settings("sqlite::memory:", 0, 0).await.expect("connect");
        sqlx::query("SELECT 1").fetch_one(&pool).await.expect("pool hands out a connection");
    }
}
