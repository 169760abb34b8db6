// Integration tests have relaxed clippy settings for brutal test scenarios.
// Production code (src/) must use strict zero-unwrap/panic patterns.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::too_many_lines,
    clippy::doc_markdown,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::indexing_slicing
)]
//! End-to-end behavior of the counting semaphore against a real database file.

mod common;

use common::Harness;
use permitdb_core::{Error, Result, SlotState, MAX_CONTEXT_CHARS, MAX_PERMITS};

fn expect_token(token: Option<permitdb_core::LockToken>) -> permitdb_core::LockToken {
    token.expect("permit should be available")
}

#[tokio::test]
async fn capacity_is_enforced_and_released_permit_is_reusable() -> Result<()> {
    let h = Harness::new().await?;

    let t1 = expect_token(h.acquire("k", 60, 2).await?);
    let t2 = expect_token(h.acquire("k", 60, 2).await?);
    assert_ne!(t1, t2);

    assert!(h.acquire("k", 60, 2).await?.is_none());

    h.semaphore.release_lock("k", t2.as_str()).await?;
    let t3 = expect_token(h.acquire("k", 60, 2).await?);
    assert_ne!(t3, t1);
    assert_ne!(t3, t2);
    Ok(())
}

#[tokio::test]
async fn expired_lease_is_reclaimed_and_old_token_is_dead() -> Result<()> {
    let h = Harness::new().await?;

    let original = expect_token(h.acquire("k", 1, 1).await?);
    h.advance_secs(2);
    let successor = expect_token(h.acquire("k", 1, 1).await?);
    assert_ne!(original, successor);

    let err = h.semaphore.release_lock("k", original.as_str()).await.err();
    assert!(matches!(err, Some(Error::LockReleaseFailed { .. })));

    // the successor still owns the slot
    h.semaphore.release_lock("k", successor.as_str()).await?;
    Ok(())
}

#[tokio::test]
async fn context_length_limit_is_inclusive() -> Result<()> {
    let h = Harness::new().await?;

    let too_long = "c".repeat(MAX_CONTEXT_CHARS + 1);
    let err = h
        .semaphore
        .attempt_to_acquire_lock("k", 60, 1, &too_long)
        .await
        .err();
    match err {
        Some(Error::InvalidArgument(msg)) => {
            assert!(msg.contains(&MAX_CONTEXT_CHARS.to_string()), "{msg}");
        }
        other => panic!("expected InvalidArgument, got {other:?}"),
    }
    assert_eq!(h.semaphore.get_lock_row_count().await?, 0);

    let exact = "c".repeat(MAX_CONTEXT_CHARS);
    let token = h
        .semaphore
        .attempt_to_acquire_lock("k", 60, 1, &exact)
        .await?;
    assert!(token.is_some());
    Ok(())
}

#[tokio::test]
async fn context_limit_counts_characters_not_bytes() -> Result<()> {
    let h = Harness::new().await?;
    let wide = "é".repeat(MAX_CONTEXT_CHARS);
    assert!(wide.len() > MAX_CONTEXT_CHARS);

    let token = h.semaphore.attempt_to_acquire_lock("k", 60, 1, &wide).await?;
    assert!(token.is_some());
    Ok(())
}

#[tokio::test]
async fn garbage_collection_only_touches_idle_keys() -> Result<()> {
    let h = Harness::with_grace(chrono::Duration::seconds(60)).await?;

    let a1 = expect_token(h.acquire("A", 600, 2).await?);
    let a2 = expect_token(h.acquire("A", 600, 2).await?);
    let _b1 = expect_token(h.acquire("B", 600, 3).await?);
    h.semaphore.release_lock("A", a1.as_str()).await?;
    h.semaphore.release_lock("A", a2.as_str()).await?;

    h.advance_secs(61);
    let b_rows = h.rows_for("B").await?;
    let deleted = h.semaphore.run_garbage_collection().await?;

    assert_eq!(deleted, 2);
    assert_eq!(h.rows_for("A").await?, 0);
    assert_eq!(h.rows_for("B").await?, b_rows);
    Ok(())
}

#[tokio::test]
async fn stale_holder_rows_are_not_collected() -> Result<()> {
    let h = Harness::with_grace(chrono::Duration::zero()).await?;
    let _token = expect_token(h.acquire("crashy", 1, 1).await?);
    h.advance_secs(10);

    assert_eq!(h.semaphore.run_garbage_collection().await?, 0);
    let slots = h.semaphore.slots("crashy").await?;
    assert_eq!(slots[0].state, SlotState::Stale);
    Ok(())
}

#[tokio::test]
async fn release_all_then_gc_empties_the_table() -> Result<()> {
    let h = Harness::new().await?;
    h.acquire("one", 60, 2).await?;
    h.acquire("two", 60, 1).await?;
    assert_eq!(h.semaphore.get_lock_row_count().await?, 3);

    assert_eq!(h.semaphore.release_all_locks().await?, 3);
    assert!(h.semaphore.get_first_unexpired_lock_context("one").await?.is_none());

    h.clock.advance(chrono::Duration::milliseconds(1));
    assert_eq!(h.semaphore.run_garbage_collection().await?, 3);
    assert_eq!(h.semaphore.get_lock_row_count().await?, 0);
    Ok(())
}

#[tokio::test]
async fn raising_permits_adds_slots_without_touching_holders() -> Result<()> {
    let h = Harness::new().await?;
    let first = expect_token(h.acquire("grow", 60, 1).await?);
    assert!(h.acquire("grow", 60, 1).await?.is_none());

    assert!(h.acquire("grow", 60, 3).await?.is_some());
    assert_eq!(h.rows_for("grow").await?, 3);

    h.semaphore.release_lock("grow", first.as_str()).await?;
    Ok(())
}

#[tokio::test]
async fn lowering_permits_ignores_higher_slots() -> Result<()> {
    let h = Harness::new().await?;
    h.semaphore.ensure_slots("shrink", 3).await?;
    let held = expect_token(h.acquire("shrink", 60, 1).await?);

    // slots 2 and 3 are free but above the requested bound
    assert!(h.acquire("shrink", 60, 1).await?.is_none());
    h.semaphore.release_lock("shrink", held.as_str()).await?;
    Ok(())
}

#[tokio::test]
async fn zero_timeout_lease_is_reclaimable_once_time_moves() -> Result<()> {
    let h = Harness::new().await?;
    assert!(h.acquire("instant", 0, 1).await?.is_some());
    assert!(h.acquire("instant", 0, 1).await?.is_none());

    h.clock.advance(chrono::Duration::milliseconds(1));
    assert!(h.acquire("instant", 0, 1).await?.is_some());
    Ok(())
}

#[tokio::test]
async fn context_lookup_ignores_expired_holders() -> Result<()> {
    let h = Harness::new().await?;
    h.semaphore
        .attempt_to_acquire_lock("ctx", 5, 1, "short job")
        .await?;
    assert_eq!(
        h.semaphore.get_first_unexpired_lock_context("ctx").await?,
        Some("short job".to_string())
    );

    h.advance_secs(6);
    assert!(h.semaphore.get_first_unexpired_lock_context("ctx").await?.is_none());
    assert!(h.semaphore.get_first_unexpired_lock_context("unknown").await?.is_none());
    Ok(())
}

#[tokio::test]
async fn oversized_permit_count_is_rejected_before_bootstrap() -> Result<()> {
    let h = Harness::new().await?;
    for permits in [MAX_PERMITS + 1, u32::MAX] {
        let err = h
            .semaphore
            .attempt_to_acquire_lock("huge", 60, permits, "ctx")
            .await
            .err();
        assert!(matches!(err, Some(Error::InvalidArgument(_))), "{err:?}");
        assert!(h.semaphore.ensure_slots("huge", permits).await.is_err());
    }
    assert_eq!(h.semaphore.get_lock_row_count().await?, 0);
    Ok(())
}
