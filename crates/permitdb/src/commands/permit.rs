//! Permit lifecycle: acquire, release, refresh.

use anyhow::Result;
use serde::Serialize;

use super::CommandContext;
use crate::{
    cli::{EXIT_NO_PERMIT, EXIT_SUCCESS},
    output::print_json,
};

#[derive(Debug, Clone)]
pub struct AcquireOptions {
    pub key: String,
    pub permits: u32,
    pub timeout_seconds: i64,
    pub context: String,
}

#[derive(Debug, Serialize)]
struct AcquireOutput<'a> {
    key: &'a str,
    acquired: bool,
    token: Option<String>,
    permits: u32,
    timeout_seconds: i64,
    context: &'a str,
}

/// Try to take a permit. Exit code 3 when none is free.
///
/// The token is printed alone on stdout in human mode so scripts can capture it.
pub async fn run_acquire(ctx: &CommandContext, options: &AcquireOptions) -> Result<i32> {
    let token = ctx
        .semaphore
        .attempt_to_acquire_lock(
            &options.key,
            options.timeout_seconds,
            options.permits,
            &options.context,
        )
        .await?;
    let acquired = token.is_some();

    if ctx.format.is_json() {
        print_json(&AcquireOutput {
            key: &options.key,
            acquired,
            token: token.map(permitdb_core::LockToken::into_inner),
            permits: options.permits,
            timeout_seconds: options.timeout_seconds,
            context: &options.context,
        })?;
    } else if let Some(token) = token {
        println!("{token}");
    } else {
        println!(
            "No permit available for '{}' (all {} held)",
            options.key, options.permits
        );
    }

    Ok(if acquired { EXIT_SUCCESS } else { EXIT_NO_PERMIT })
}

#[derive(Debug, Serialize)]
struct ReleaseOutput<'a> {
    key: &'a str,
    released: bool,
}

pub async fn run_release(ctx: &CommandContext, key: &str, token: &str) -> Result<i32> {
    ctx.semaphore.release_lock(key, token).await?;

    if ctx.format.is_json() {
        print_json(&ReleaseOutput {
            key,
            released: true,
        })?;
    } else {
        println!("Released permit on '{key}'");
    }
    Ok(EXIT_SUCCESS)
}

#[derive(Debug, Serialize)]
struct RefreshOutput<'a> {
    key: &'a str,
    refreshed: bool,
    timeout_seconds: i64,
}

pub async fn run_refresh(
    ctx: &CommandContext,
    key: &str,
    token: &str,
    timeout_seconds: i64,
) -> Result<i32> {
    ctx.semaphore
        .refresh_lock_timeout(key, token, timeout_seconds)
        .await?;

    if ctx.format.is_json() {
        print_json(&RefreshOutput {
            key,
            refreshed: true,
            timeout_seconds,
        })?;
    } else {
        println!("Refreshed permit on '{key}' for {timeout_seconds}s");
    }
    Ok(EXIT_SUCCESS)
}
