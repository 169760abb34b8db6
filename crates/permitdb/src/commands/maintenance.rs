//! Maintenance: reset and garbage collection.

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use permitdb_core::{GarbageCollector, GcSummary};
use serde::Serialize;
use tokio::sync::Notify;

use super::CommandContext;
use crate::{cli::EXIT_SUCCESS, output::print_json};

#[derive(Debug, Serialize)]
struct ResetOutput {
    reset: u64,
}

pub async fn run_reset(ctx: &CommandContext) -> Result<i32> {
    let reset = ctx.semaphore.release_all_locks().await?;

    if ctx.format.is_json() {
        print_json(&ResetOutput { reset })?;
    } else {
        println!("Released all permits ({reset} slots reset)");
    }
    Ok(EXIT_SUCCESS)
}

#[derive(Debug, Clone, Copy)]
pub struct GcOptions {
    pub watch: bool,
    /// Overrides `gc.interval_secs` in watch mode.
    pub interval_secs: Option<u64>,
}

#[derive(Debug, Serialize)]
struct GcOutput {
    deleted: u64,
}

#[derive(Debug, Serialize)]
struct WatchOutput {
    sweeps: u64,
    failed_sweeps: u64,
    deleted: u64,
}

impl From<GcSummary> for WatchOutput {
    fn from(summary: GcSummary) -> Self {
        Self {
            sweeps: summary.sweeps,
            failed_sweeps: summary.failed_sweeps,
            deleted: summary.deleted,
        }
    }
}

pub async fn run_gc(ctx: &CommandContext, options: GcOptions) -> Result<i32> {
    if options.watch {
        return run_watch(ctx, options).await;
    }

    let deleted = ctx.semaphore.run_garbage_collection().await?;
    if ctx.format.is_json() {
        print_json(&GcOutput { deleted })?;
    } else {
        println!("Deleted {deleted} idle slots");
    }
    Ok(EXIT_SUCCESS)
}

/// Sweep until Ctrl-C.
async fn run_watch(ctx: &CommandContext, options: GcOptions) -> Result<i32> {
    let interval = options
        .interval_secs
        .map_or_else(|| ctx.config.gc.interval(), Duration::from_secs);
    let collector = GarbageCollector::new(Arc::clone(&ctx.semaphore), interval);

    let shutdown = Arc::new(Notify::new());
    let signal = {
        let shutdown = Arc::clone(&shutdown);
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => tracing::info!("Received Ctrl-C, stopping garbage collector"),
                Err(e) => tracing::error!(error = %e, "Failed to listen for Ctrl-C"),
            }
            shutdown.notify_one();
        })
    };

    if !ctx.format.is_json() {
        eprintln!(
            "Collecting every {}s, press Ctrl-C to stop",
            interval.as_secs()
        );
    }

    let summary = collector.run(&shutdown).await;
    signal.abort();

    if ctx.format.is_json() {
        print_json(&WatchOutput::from(summary))?;
    } else {
        println!(
            "Stopped after {} sweeps: {} idle slots deleted, {} sweeps failed",
            summary.sweeps, summary.deleted, summary.failed_sweeps
        );
    }
    Ok(EXIT_SUCCESS)
}
