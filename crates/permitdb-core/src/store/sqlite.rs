//! `SQLite` implementation of [`SlotStore`].
//!
//! `SQLite` has neither row locks nor `NOWAIT`, so claiming is an optimistic
//! compare-and-swap on the token column: read the claimable candidates, then
//! update one only if its token is still what was read. A lost swap moves on to
//! the next candidate instead of waiting for the row. If every candidate is lost
//! the scan runs once more, then the claim gives up.
//!
//! Each operation checks out its own pooled connection and runs in autocommit
//! mode, so its writes are committed before it returns regardless of what the
//! caller's own connection is doing.
//!
//! `SQLite` allows one writer per database file. The store therefore owns its
//! file: the pool is private and only [`SqliteSlotStore::open`] builds one. A
//! caller's business transaction runs against a different database and can
//! hold its write lock for as long as it likes without delaying any semaphore
//! operation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{pool::PoolConnection, Sqlite, SqlitePool};
use tracing::debug;

use super::{
    schema::{create_connection_pool, init_schema},
    SlotClaim, SlotStore,
};
use crate::{
    config::DatabaseConfig,
    slot::{LockToken, Slot},
    Error, Result,
};

/// Candidate scans per claim: the first pass plus one retry.
const CLAIM_SCANS: usize = 2;

/// Slot store backed by a dedicated `SQLite` database file.
///
/// Do not keep application tables in the same file: a caller transaction that
/// writes there takes the file's only write lock, and semaphore writes would
/// wait for it up to the busy timeout.
#[derive(Debug, Clone)]
pub struct SqliteSlotStore {
    pool: SqlitePool,
}

#[derive(Debug, sqlx::FromRow)]
struct SlotRow {
    lock_key: String,
    slot_number: i64,
    token: Option<String>,
    expires_on: Option<i64>,
    context: Option<String>,
    created_on: i64,
}

impl SqliteSlotStore {
    /// Open (creating if needed) the database described by `config` and apply the schema.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the parent directory cannot be created and
    /// `Error::Database` if the connection or schema initialization fails.
    pub async fn open(config: &DatabaseConfig) -> Result<Self> {
        let pool = create_connection_pool(config).await?;
        Self::from_pool(pool).await
    }

    /// Wrap a pool opened on the store's own file, applying the schema.
    pub(crate) async fn from_pool(pool: SqlitePool) -> Result<Self> {
        init_schema(&pool).await?;
        Ok(Self { pool })
    }

    #[cfg(test)]
    pub(crate) const fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Check out a connection dedicated to one operation.
    ///
    /// The pool is never shared with the caller, so statements run on this
    /// connection commit independently of any enclosing business transaction.
    async fn independent_unit(&self) -> Result<PoolConnection<Sqlite>> {
        Ok(self.pool.acquire().await?)
    }
}

fn millis(instant: DateTime<Utc>) -> i64 {
    instant.timestamp_millis()
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms).ok_or_else(|| {
        Error::Database(sqlx::Error::Decode(
            format!("timestamp out of range: {ms}").into(),
        ))
    })
}

fn slot_number(raw: i64) -> Result<u32> {
    u32::try_from(raw).map_err(|e| {
        Error::Database(sqlx::Error::Decode(
            format!("slot number {raw} out of range: {e}").into(),
        ))
    })
}

impl TryFrom<SlotRow> for Slot {
    type Error = Error;

    fn try_from(row: SlotRow) -> Result<Self> {
        Ok(Self {
            key: row.lock_key,
            slot_number: slot_number(row.slot_number)?,
            token: row.token.map(LockToken::from),
            expires_on: row.expires_on.map(from_millis).transpose()?,
            context: row.context,
            created_on: from_millis(row.created_on)?,
        })
    }
}

#[async_trait]
impl SlotStore for SqliteSlotStore {
    async fn ensure_slots(&self, key: &str, permits: u32, now: DateTime<Utc>) -> Result<u64> {
        let mut conn = self.independent_unit().await?;
        let created = sqlx::query(
            "WITH RECURSIVE seq(n) AS (SELECT 1 UNION ALL SELECT n + 1 FROM seq WHERE n < ?)
             INSERT OR IGNORE INTO semaphore_slots
                 (lock_key, slot_number, token, expires_on, context, created_on)
             SELECT ?, n, NULL, NULL, NULL, ? FROM seq",
        )
        .bind(i64::from(permits))
        .bind(key)
        .bind(millis(now))
        .execute(&mut *conn)
        .await?
        .rows_affected();

        if created > 0 {
            debug!(key, permits, created, "Bootstrapped semaphore slots");
        }
        Ok(created)
    }

    async fn claim_slot(&self, claim: SlotClaim<'_>) -> Result<Option<u32>> {
        let mut conn = self.independent_unit().await?;
        let now = millis(claim.now);

        for scan in 0..CLAIM_SCANS {
            let candidates: Vec<(i64, Option<String>)> = sqlx::query_as(
                "SELECT slot_number, token FROM semaphore_slots
                 WHERE lock_key = ? AND slot_number <= ? AND (token IS NULL OR expires_on < ?)
                 ORDER BY slot_number",
            )
            .bind(claim.key)
            .bind(i64::from(claim.max_permits))
            .bind(now)
            .fetch_all(&mut *conn)
            .await?;

            if candidates.is_empty() {
                return Ok(None);
            }

            for (candidate, observed) in candidates {
                let swapped = sqlx::query(
                    "UPDATE semaphore_slots SET token = ?, expires_on = ?, context = ?
                     WHERE lock_key = ? AND slot_number = ? AND token IS ?
                       AND (token IS NULL OR expires_on < ?)",
                )
                .bind(claim.token.as_str())
                .bind(millis(claim.expires_on))
                .bind(claim.context)
                .bind(claim.key)
                .bind(candidate)
                .bind(observed)
                .bind(now)
                .execute(&mut *conn)
                .await?
                .rows_affected();

                if swapped == 1 {
                    return slot_number(candidate).map(Some);
                }
                debug!(
                    key = claim.key,
                    slot = candidate,
                    scan,
                    "Slot claimed concurrently, skipping"
                );
            }
        }

        Ok(None)
    }

    async fn release_slot(
        &self,
        key: &str,
        token: &str,
        retain_until: DateTime<Utc>,
    ) -> Result<bool> {
        let mut conn = self.independent_unit().await?;
        let rows = sqlx::query(
            "UPDATE semaphore_slots SET token = NULL, expires_on = ?
             WHERE lock_key = ? AND token = ?",
        )
        .bind(millis(retain_until))
        .bind(key)
        .bind(token)
        .execute(&mut *conn)
        .await?
        .rows_affected();
        Ok(rows > 0)
    }

    async fn extend_lease(
        &self,
        key: &str,
        token: &str,
        now: DateTime<Utc>,
        expires_on: DateTime<Utc>,
    ) -> Result<bool> {
        let mut conn = self.independent_unit().await?;
        let rows = sqlx::query(
            "UPDATE semaphore_slots SET expires_on = ?
             WHERE lock_key = ? AND token = ? AND expires_on >= ?",
        )
        .bind(millis(expires_on))
        .bind(key)
        .bind(token)
        .bind(millis(now))
        .execute(&mut *conn)
        .await?
        .rows_affected();
        Ok(rows > 0)
    }

    async fn expire_all(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut conn = self.independent_unit().await?;
        let rows = sqlx::query("UPDATE semaphore_slots SET token = NULL, expires_on = ?")
            .bind(millis(now))
            .execute(&mut *conn)
            .await?
            .rows_affected();
        Ok(rows)
    }

    async fn delete_idle(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut conn = self.independent_unit().await?;
        let rows =
            sqlx::query("DELETE FROM semaphore_slots WHERE token IS NULL AND expires_on < ?")
                .bind(millis(now))
                .execute(&mut *conn)
                .await?
                .rows_affected();
        Ok(rows)
    }

    async fn first_unexpired_context(
        &self,
        key: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<String>> {
        let row: Option<(Option<String>,)> = sqlx::query_as(
            "SELECT context FROM semaphore_slots
             WHERE lock_key = ? AND token IS NOT NULL AND expires_on >= ?
             ORDER BY slot_number
             LIMIT 1",
        )
        .bind(key)
        .bind(millis(now))
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.and_then(|(context,)| context))
    }

    async fn count_rows(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM semaphore_slots")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn list_slots(&self, key: &str) -> Result<Vec<Slot>> {
        let rows: Vec<SlotRow> = sqlx::query_as(
            "SELECT lock_key, slot_number, token, expires_on, context, created_on
             FROM semaphore_slots WHERE lock_key = ? ORDER BY slot_number",
        )
        .bind(key)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Slot::try_from).collect()
    }
}
