//! Schema setup.

use diesel_async::SimpleAsyncConnection;
use tracing::debug;

use super::pool::{DbError, SqlitePool};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS records (
        key TEXT PRIMARY KEY NOT NULL,
        fields TEXT NOT NULL DEFAULT '{}',
        complete INTEGER NOT NULL DEFAULT 0,
        updated_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_records_complete ON records(complete);
"#;

/// Create tables and indexes if they are missing. Safe to run repeatedly.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), DbError> {
    let mut conn = pool.get().await?;
    conn.batch_execute("PRAGMA journal_mode = WAL;").await?;
    conn.batch_execute(SCHEMA).await?;
    debug!("Schema ready at {}", pool.database_url());
    Ok(())
}
