//! Common test utilities and relaxed clippy settings for permitdb-core integration tests

#![allow(
    dead_code,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

use std::sync::Arc;

use permitdb_core::{
    CountingSemaphore, DatabaseConfig, LockToken, ManualClock, Result, SqliteSlotStore,
};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    SqlitePool,
};
use tempfile::TempDir;

/// A semaphore over a fresh database file, plus handles for steering it.
pub struct Harness {
    pub semaphore: Arc<CountingSemaphore<SqliteSlotStore>>,
    pub clock: Arc<ManualClock>,
    pub config: DatabaseConfig,
    dir: TempDir,
}

impl Harness {
    pub async fn new() -> Result<Self> {
        Self::with_grace(chrono::Duration::seconds(300)).await
    }

    pub async fn with_grace(grace: chrono::Duration) -> Result<Self> {
        let dir = TempDir::new()?;
        let config = DatabaseConfig {
            path: dir.path().join("permits.sqlite3"),
            ..DatabaseConfig::default()
        };
        let clock = Arc::new(ManualClock::starting_now());
        let semaphore = Self::open_with(&config, clock.clone(), grace).await?;
        semaphore.release_all_locks().await?;
        Ok(Self {
            semaphore,
            clock,
            config,
            dir,
        })
    }

    /// A second semaphore instance over the same database, as another process would open it.
    pub async fn reopen(&self) -> Result<Arc<CountingSemaphore<SqliteSlotStore>>> {
        Self::open_with(&self.config, self.clock.clone(), self.semaphore.grace_period()).await
    }

    async fn open_with(
        config: &DatabaseConfig,
        clock: Arc<ManualClock>,
        grace: chrono::Duration,
    ) -> Result<Arc<CountingSemaphore<SqliteSlotStore>>> {
        let store = SqliteSlotStore::open(config).await?;
        Ok(Arc::new(
            CountingSemaphore::new(store)
                .with_clock(clock)
                .with_grace_period(grace),
        ))
    }

    /// Application database in its own file, with an `orders` table.
    pub async fn business_pool(&self) -> Result<SqlitePool> {
        let pool = Self::raw_pool(&self.dir.path().join("orders.sqlite3")).await?;
        sqlx::query("CREATE TABLE IF NOT EXISTS orders (id INTEGER PRIMARY KEY, note TEXT NOT NULL)")
            .execute(&pool)
            .await?;
        Ok(pool)
    }

    /// Plain connection pool on the semaphore's own file, for read-only inspection.
    pub async fn semaphore_file_pool(&self) -> Result<SqlitePool> {
        Self::raw_pool(&self.config.path).await
    }

    async fn raw_pool(path: &std::path::Path) -> Result<SqlitePool> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);
        Ok(SqlitePoolOptions::new()
            .max_connections(2)
            .connect_with(options)
            .await?)
    }

    pub fn advance_secs(&self, secs: i64) {
        self.clock.advance(chrono::Duration::seconds(secs));
    }

    pub async fn acquire(&self, key: &str, timeout: i64, permits: u32) -> Result<Option<LockToken>> {
        self.semaphore
            .attempt_to_acquire_lock(key, timeout, permits, "integration test")
            .await
    }

    pub async fn rows_for(&self, key: &str) -> Result<usize> {
        Ok(self.semaphore.slots(key).await?.len())
    }
}
