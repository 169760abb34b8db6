//! Counting semaphore over a shared slot store.
//!
//! At most `max_permits` holders per key, across every process pointed at the
//! same store. Holders receive an opaque [`LockToken`] whose lease ends after
//! the requested timeout unless refreshed. A crashed holder loses its slot only
//! when the lease lapses; there is no failure detector.
//!
//! # Outcomes
//!
//! - No permit available: `Ok(None)`, never an error. Callers that want to wait
//!   poll with their own backoff.
//! - Bad arguments: `Error::InvalidArgument`, before the store is touched.
//! - Release/refresh with a token that no longer owns a slot:
//!   `Error::LockReleaseFailed`.
//! - Store failures: `Error::Database`, unmodified, never retried here.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use crate::{
    clock::{Clock, SystemClock},
    config::{SemaphoreConfig, DEFAULT_GRACE_PERIOD_SECS},
    slot::{LockToken, SlotView},
    store::{SlotClaim, SlotStore},
    validation::{lease_duration, validate_context, validate_key, validate_max_permits},
    Error, Result,
};

/// Database-backed counting semaphore.
#[derive(Debug)]
pub struct CountingSemaphore<S> {
    store: S,
    clock: Arc<dyn Clock>,
    grace_period: Duration,
}

impl<S: SlotStore> CountingSemaphore<S> {
    /// Create a semaphore with the system clock and the default grace period.
    pub fn new(store: S) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            grace_period: Duration::seconds(DEFAULT_GRACE_PERIOD_SECS),
        }
    }

    /// Create a semaphore using configured settings.
    pub fn with_config(store: S, config: &SemaphoreConfig) -> Self {
        Self::new(store).with_grace_period(config.grace_period())
    }

    /// Replace the time source.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the retention window applied on release.
    #[must_use]
    pub const fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    /// Get the underlying store
    pub const fn store(&self) -> &S {
        &self.store
    }

    pub const fn grace_period(&self) -> Duration {
        self.grace_period
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    fn instant_after(now: DateTime<Utc>, delta: Duration) -> Result<DateTime<Utc>> {
        now.checked_add_signed(delta)
            .ok_or_else(|| Error::invalid_argument(format!("Timeout is too large: {delta}")))
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // BOOTSTRAP
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Make sure slots `1..=permits` exist for `key`. Safe to call concurrently.
    /// Returns how many slots this call created.
    pub async fn ensure_slots(&self, key: &str, permits: u32) -> Result<u64> {
        validate_key(key)?;
        validate_max_permits(permits)?;
        self.store.ensure_slots(key, permits, self.now()).await
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // ACQUIRE / RELEASE / REFRESH
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Try to take one of `max_permits` slots for `key`, leased for `timeout_seconds`.
    ///
    /// Returns `Ok(None)` when every eligible slot is held or contended.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidArgument` if:
    /// - `key` is empty
    /// - `context` is blank or longer than [`crate::MAX_CONTEXT_CHARS`]
    /// - `max_permits` is zero or above [`crate::MAX_PERMITS`]
    /// - `timeout_seconds` is negative
    pub async fn attempt_to_acquire_lock(
        &self,
        key: &str,
        timeout_seconds: i64,
        max_permits: u32,
        context: &str,
    ) -> Result<Option<LockToken>> {
        validate_key(key)?;
        validate_context(context)?;
        validate_max_permits(max_permits)?;
        let lease = lease_duration(timeout_seconds)?;

        let now = self.now();
        let expires_on = Self::instant_after(now, lease)?;

        self.store.ensure_slots(key, max_permits, now).await?;

        let token = LockToken::generate();
        let claimed = self
            .store
            .claim_slot(SlotClaim {
                key,
                max_permits,
                token: &token,
                context,
                now,
                expires_on,
            })
            .await?;

        match claimed {
            Some(slot) => {
                info!(
                    key,
                    slot,
                    context,
                    timeout_seconds,
                    token = %token.redacted(),
                    "Acquired semaphore permit"
                );
                Ok(Some(token))
            }
            None => {
                debug!(key, max_permits, context, "No semaphore permit available");
                Ok(None)
            }
        }
    }

    /// Give back the slot held by `token`.
    ///
    /// The slot is claimable again immediately; the row itself is kept for the
    /// grace period before garbage collection may delete it.
    ///
    /// # Errors
    ///
    /// Returns `Error::LockReleaseFailed` if `token` does not hold a slot for `key`.
    pub async fn release_lock(&self, key: &str, token: &str) -> Result<()> {
        validate_key(key)?;
        let retain_until = Self::instant_after(self.now(), self.grace_period)?;

        if self.store.release_slot(key, token, retain_until).await? {
            info!(key, "Released semaphore permit");
            Ok(())
        } else {
            warn!(key, "Release rejected: token does not hold a slot");
            Err(Error::lock_release_failed(key))
        }
    }

    /// Extend the lease of `token` to `timeout_seconds` from now.
    ///
    /// # Errors
    ///
    /// Returns `Error::LockReleaseFailed` if `token` does not hold an unexpired
    /// slot for `key`.
    pub async fn refresh_lock_timeout(
        &self,
        key: &str,
        token: &str,
        timeout_seconds: i64,
    ) -> Result<()> {
        validate_key(key)?;
        let lease = lease_duration(timeout_seconds)?;
        let now = self.now();
        let expires_on = Self::instant_after(now, lease)?;

        if self.store.extend_lease(key, token, now, expires_on).await? {
            debug!(key, timeout_seconds, "Refreshed semaphore lease");
            Ok(())
        } else {
            warn!(key, "Refresh rejected: token does not hold an unexpired slot");
            Err(Error::lock_release_failed(key))
        }
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // ADMINISTRATION
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Force-release every slot of every key and make all rows collectable.
    /// Meant for start-up cleanup and test isolation. Returns rows reset.
    pub async fn release_all_locks(&self) -> Result<u64> {
        let reset = self.store.expire_all(self.now()).await?;
        info!(reset, "Released all semaphore permits");
        Ok(reset)
    }

    /// Delete released rows whose grace window is over. Returns rows deleted.
    ///
    /// Rows still carrying a token are kept even when their lease lapsed; they
    /// stay claimable in place.
    pub async fn run_garbage_collection(&self) -> Result<u64> {
        let deleted = self.store.delete_idle(self.now()).await?;
        if deleted > 0 {
            info!(deleted, "Garbage collected idle semaphore slots");
        } else {
            debug!("No idle semaphore slots to collect");
        }
        Ok(deleted)
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // DIAGNOSTICS
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Context label of some current holder of `key`, if any.
    pub async fn get_first_unexpired_lock_context(&self, key: &str) -> Result<Option<String>> {
        self.store.first_unexpired_context(key, self.now()).await
    }

    /// Total slot rows across all keys.
    pub async fn get_lock_row_count(&self) -> Result<i64> {
        self.store.count_rows().await
    }

    /// Slots of `key` with their state at the current time.
    pub async fn slots(&self, key: &str) -> Result<Vec<SlotView>> {
        validate_key(key)?;
        let now = self.now();
        let slots = self.store.list_slots(key).await?;
        Ok(slots.iter().map(|slot| slot.view(now)).collect())
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::{
        clock::ManualClock, config::DatabaseConfig, slot::SlotState, store::SqliteSlotStore,
        MAX_CONTEXT_CHARS,
    };

    struct Fixture {
        semaphore: CountingSemaphore<SqliteSlotStore>,
        clock: Arc<ManualClock>,
        _dir: TempDir,
    }

    async fn setup() -> Result<Fixture> {
        let dir = TempDir::new()?;
        let config = DatabaseConfig {
            path: dir.path().join("semaphore.sqlite3"),
            ..DatabaseConfig::default()
        };
        let store = SqliteSlotStore::open(&config).await?;
        let clock = Arc::new(ManualClock::starting_now());
        let semaphore = CountingSemaphore::new(store).with_clock(clock.clone());
        semaphore.release_all_locks().await?;
        Ok(Fixture {
            semaphore,
            clock,
            _dir: dir,
        })
    }

    #[tokio::test]
    async fn test_null_key_rejected_before_store_access() -> Result<()> {
        let f = setup().await?;
        let err = f
            .semaphore
            .attempt_to_acquire_lock("", 60, 2, "some context")
            .await
            .err();
        assert!(matches!(err, Some(Error::InvalidArgument(msg)) if msg == "Key cannot be null"));
        assert_eq!(f.semaphore.get_lock_row_count().await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_blank_context_rejected() -> Result<()> {
        let f = setup().await?;
        let err = f
            .semaphore
            .attempt_to_acquire_lock("aKey", 60, 2, " \t")
            .await
            .err();
        assert!(
            matches!(err, Some(Error::InvalidArgument(msg)) if msg == "Context cannot be null or empty")
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_context_at_max_length_is_visible_to_operators() -> Result<()> {
        let f = setup().await?;
        let context = "a".repeat(MAX_CONTEXT_CHARS);
        let token = f
            .semaphore
            .attempt_to_acquire_lock("aKey", 60, 2, &context)
            .await?;
        assert!(token.is_some());
        assert_eq!(
            f.semaphore.get_first_unexpired_lock_context("aKey").await?,
            Some(context)
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_acquire_bootstraps_requested_capacity() -> Result<()> {
        let f = setup().await?;
        f.semaphore
            .attempt_to_acquire_lock("keyOne", 2, 3, "ctx")
            .await?;
        assert_eq!(f.semaphore.get_lock_row_count().await?, 3);

        let states: Vec<SlotState> = f
            .semaphore
            .slots("keyOne")
            .await?
            .into_iter()
            .map(|s| s.state)
            .collect();
        assert_eq!(
            states,
            vec![SlotState::Held, SlotState::Available, SlotState::Available]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_lease_expiry_frees_slot() -> Result<()> {
        let f = setup().await?;
        let first = f
            .semaphore
            .attempt_to_acquire_lock("sampleKey", 1, 1, "ctx")
            .await?;
        assert!(first.is_some());
        assert!(f
            .semaphore
            .attempt_to_acquire_lock("sampleKey", 1, 1, "ctx")
            .await?
            .is_none());

        f.clock.advance(Duration::seconds(2));
        let second = f
            .semaphore
            .attempt_to_acquire_lock("sampleKey", 1, 1, "ctx")
            .await?;
        assert!(second.is_some());
        assert_ne!(first, second);
        Ok(())
    }

    #[tokio::test]
    async fn test_refresh_keeps_lock_past_original_timeout() -> Result<()> {
        let f = setup().await?;
        let token = f
            .semaphore
            .attempt_to_acquire_lock("sampleKey", 2, 1, "ctx")
            .await?
            .ok_or_else(|| Error::invalid_argument("expected a token"))?;

        for _ in 0..3 {
            f.semaphore
                .refresh_lock_timeout("sampleKey", token.as_str(), 2)
                .await?;
            f.clock.advance(Duration::seconds(1));
        }
        f.semaphore.release_lock("sampleKey", token.as_str()).await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_refresh_strictly_extends_expiry() -> Result<()> {
        let f = setup().await?;
        let token = f
            .semaphore
            .attempt_to_acquire_lock("sampleKey", 10, 1, "ctx")
            .await?
            .ok_or_else(|| Error::invalid_argument("expected a token"))?;
        let before = f.semaphore.slots("sampleKey").await?[0].expires_on;

        f.clock.advance(Duration::seconds(1));
        f.semaphore
            .refresh_lock_timeout("sampleKey", token.as_str(), 10)
            .await?;
        let after = f.semaphore.slots("sampleKey").await?[0].expires_on;
        assert!(after > before);
        Ok(())
    }

    #[tokio::test]
    async fn test_refresh_expired_lock_fails() -> Result<()> {
        let f = setup().await?;
        let token = f
            .semaphore
            .attempt_to_acquire_lock("sampleKey", 1, 1, "ctx")
            .await?
            .ok_or_else(|| Error::invalid_argument("expected a token"))?;
        f.clock.advance(Duration::seconds(2));

        let err = f
            .semaphore
            .refresh_lock_timeout("sampleKey", token.as_str(), 1)
            .await
            .err();
        assert!(matches!(err, Some(Error::LockReleaseFailed { key }) if key == "sampleKey"));
        Ok(())
    }

    #[tokio::test]
    async fn test_double_release_fails() -> Result<()> {
        let f = setup().await?;
        let token = f
            .semaphore
            .attempt_to_acquire_lock("sampleKey", 60, 1, "ctx")
            .await?
            .ok_or_else(|| Error::invalid_argument("expected a token"))?;
        f.semaphore.release_lock("sampleKey", token.as_str()).await?;
        let err = f
            .semaphore
            .release_lock("sampleKey", token.as_str())
            .await
            .err();
        assert!(matches!(err, Some(Error::LockReleaseFailed { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_release_with_wrong_key_fails() -> Result<()> {
        let f = setup().await?;
        let token = f
            .semaphore
            .attempt_to_acquire_lock("sampleKey", 60, 1, "ctx")
            .await?
            .ok_or_else(|| Error::invalid_argument("expected a token"))?;
        let err = f
            .semaphore
            .release_lock("otherKey", token.as_str())
            .await
            .err();
        assert!(matches!(err, Some(Error::LockReleaseFailed { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_release_after_release_all_fails() -> Result<()> {
        let f = setup().await?;
        let token = f
            .semaphore
            .attempt_to_acquire_lock("sampleKey", 1, 1, "ctx")
            .await?
            .ok_or_else(|| Error::invalid_argument("expected a token"))?;
        f.semaphore.release_all_locks().await?;
        assert!(f
            .semaphore
            .release_lock("sampleKey", token.as_str())
            .await
            .is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_release_keeps_row_for_grace_period() -> Result<()> {
        let f = setup().await?;
        let store = SqliteSlotStore::from_pool(f.semaphore.store().pool().clone()).await?;
        let semaphore = CountingSemaphore::new(store)
            .with_clock(f.clock.clone())
            .with_grace_period(Duration::seconds(30));

        let token = semaphore
            .attempt_to_acquire_lock("graceKey", 60, 1, "ctx")
            .await?
            .ok_or_else(|| Error::invalid_argument("expected a token"))?;
        semaphore.release_lock("graceKey", token.as_str()).await?;

        // released slot is claimable right away
        assert_eq!(semaphore.slots("graceKey").await?[0].state, SlotState::Available);
        assert_eq!(semaphore.run_garbage_collection().await?, 0);

        f.clock.advance(Duration::seconds(31));
        assert_eq!(semaphore.run_garbage_collection().await?, 1);
        assert_eq!(semaphore.get_lock_row_count().await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_invalid_permits_and_timeout_rejected() -> Result<()> {
        let f = setup().await?;
        assert!(f
            .semaphore
            .attempt_to_acquire_lock("k", 60, 0, "ctx")
            .await
            .is_err());
        assert!(f
            .semaphore
            .attempt_to_acquire_lock("k", -5, 1, "ctx")
            .await
            .is_err());
        assert_eq!(f.semaphore.get_lock_row_count().await?, 0);
        Ok(())
    }
}
