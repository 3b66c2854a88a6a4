use std::time::Duration;

use sqlx::sqlite::SqlitePoolOptions;

use expenseflow_core::config::DatabaseConfig;

pub type DbPool = sqlx::SqlitePool;

/// Opens the pool described by a validated [`DatabaseConfig`].
pub async fn connect(config: &DatabaseConfig) -> Result<DbPool, sqlx::Error> {
    connect_with_settings(&config.url, config.max_connections, config.timeout_secs).await
}

/// Settings are assumed validated (`AppConfig::validate` rejects zero
/// connections and out-of-range timeouts). Each connection gets the same
/// pragmas: enforced foreign keys for the expense/event/site graph, WAL so
/// history reads never block the compare-and-swap writer, and a busy
/// timeout aligned with the pool acquire timeout so a blocked writer gives
/// up at the same horizon as pool acquisition.
pub async fn connect_with_settings(
    database_url: &str,
    max_connections: u32,
    timeout_secs: u64,
) -> Result<DbPool, sqlx::Error> {
    let busy_timeout_ms = timeout_secs.saturating_mul(1000);
    SqlitePoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(timeout_secs))
        .after_connect(move |conn, _meta| {
            Box::pin(async move {
                sqlx::query("PRAGMA foreign_keys = ON").execute(&mut *conn).await?;
                sqlx::query("PRAGMA journal_mode = WAL").execute(&mut *conn).await?;
                let busy_timeout = format!("PRAGMA busy_timeout = {busy_timeout_ms}");
                sqlx::query(&busy_timeout).execute(&mut *conn).await?;
                Ok(())
            })
        })
        .connect(database_url)
        .await
}
