//! Database schema definitions and initialization

use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous},
    SqlitePool,
};

use crate::{config::DatabaseConfig, Result};

/// Database schema as SQL string - executed on every open.
///
/// Timestamps are unix milliseconds. `expires_on` is NULL only for slots that
/// were bootstrapped and never claimed or reset.
pub const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS semaphore_slots (
    lock_key TEXT NOT NULL,
    slot_number INTEGER NOT NULL CHECK(slot_number >= 1),
    token TEXT,
    expires_on INTEGER,
    context TEXT CHECK(context IS NULL OR length(context) <= 256),
    created_on INTEGER NOT NULL,
    PRIMARY KEY (lock_key, slot_number)
);

CREATE INDEX IF NOT EXISTS idx_semaphore_slots_token ON semaphore_slots(lock_key, token);
CREATE INDEX IF NOT EXISTS idx_semaphore_slots_idle ON semaphore_slots(token, expires_on);
";

/// Create the `SQLite` connection pool for a database file, creating it if needed.
pub(crate) async fn create_connection_pool(config: &DatabaseConfig) -> Result<SqlitePool> {
    if let Some(parent) = config.path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    let options = SqliteConnectOptions::new()
        .filename(&config.path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(config.busy_timeout());

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(1)
        .connect_with(options)
        .await?;
    Ok(pool)
}

/// Initialize database schema
pub(crate) async fn init_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(SCHEMA).execute(pool).await?;
    Ok(())
}
