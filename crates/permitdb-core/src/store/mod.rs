//! Slot Store Trait - Abstraction boundary for slot persistence.
//!
//! The store is the only arbitration point between processes: no slot state is
//! cached in memory. Every method runs as its own unit of work, committed before
//! it returns and never joined to a transaction the caller may have open.
//!
//! Callers supply `now`; stores do not read the clock.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    slot::{LockToken, Slot},
    Result,
};

mod schema;
mod sqlite;

pub use schema::SCHEMA;
pub use sqlite::SqliteSlotStore;

/// Parameters for claiming one slot.
#[derive(Debug, Clone, Copy)]
pub struct SlotClaim<'a> {
    pub key: &'a str,
    /// Only slots `1..=max_permits` are eligible.
    pub max_permits: u32,
    pub token: &'a LockToken,
    pub context: &'a str,
    pub now: DateTime<Utc>,
    pub expires_on: DateTime<Utc>,
}

/// Persistence boundary for the counting semaphore.
#[async_trait]
pub trait SlotStore: Send + Sync {
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // BOOTSTRAP
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Make sure rows `1..=permits` exist for `key` with an atomic
    /// insert-or-ignore. Returns how many rows this call created.
    async fn ensure_slots(&self, key: &str, permits: u32, now: DateTime<Utc>) -> Result<u64>;

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // OWNERSHIP
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Claim one free or stale slot without waiting on contended rows.
    /// Returns the claimed slot number, or `None` when nothing could be claimed.
    async fn claim_slot(&self, claim: SlotClaim<'_>) -> Result<Option<u32>>;

    /// Clear the token of the slot held by `token`, keeping the row until
    /// `retain_until`. Returns `false` when no slot matches.
    async fn release_slot(
        &self,
        key: &str,
        token: &str,
        retain_until: DateTime<Utc>,
    ) -> Result<bool>;

    /// Move the lease end of an unexpired slot held by `token`.
    /// Returns `false` when no unexpired slot matches.
    async fn extend_lease(
        &self,
        key: &str,
        token: &str,
        now: DateTime<Utc>,
        expires_on: DateTime<Utc>,
    ) -> Result<bool>;

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // ADMINISTRATION
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Clear every token and stamp every row with `now`. Returns rows touched.
    async fn expire_all(&self, now: DateTime<Utc>) -> Result<u64>;

    /// Delete rows with no token whose expiry is before `now`. Returns rows deleted.
    async fn delete_idle(&self, now: DateTime<Utc>) -> Result<u64>;

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // DIAGNOSTICS
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Context of any slot for `key` held with a lease ending at or after `now`.
    async fn first_unexpired_context(&self, key: &str, now: DateTime<Utc>)
        -> Result<Option<String>>;

    /// Total rows across all keys.
    async fn count_rows(&self) -> Result<i64>;

    /// Every slot of `key`, ordered by slot number.
    async fn list_slots(&self, key: &str) -> Result<Vec<Slot>>;
}
