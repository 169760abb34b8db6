//! CLI command handlers that bridge between `clap` and the command implementations

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use clap::{error::ErrorKind, ArgMatches};
use permitdb_core::{load_config, Config};
use tracing_subscriber::EnvFilter;

use super::{build_cli, EXIT_FAILURE, EXIT_SUCCESS};
use crate::{
    commands::{
        inspect, maintenance,
        maintenance::GcOptions,
        permit::{self, AcquireOptions},
        CommandContext,
    },
    output::{report_error, OutputFormat},
};

/// Parse arguments, run the selected command and return the process exit code.
pub async fn run_cli() -> Result<i32> {
    let matches = match build_cli().try_get_matches() {
        Ok(matches) => matches,
        Err(e) => {
            let _ = e.print();
            return Ok(
                if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) {
                    EXIT_SUCCESS
                } else {
                    EXIT_FAILURE
                },
            );
        }
    };

    let Some((name, sub_m)) = matches.subcommand() else {
        return Err(anyhow!("A subcommand is required"));
    };

    init_tracing(sub_m.get_flag("verbose"));
    let format = get_format(sub_m);

    match run_command(name, sub_m, format).await {
        Ok(code) => Ok(code),
        Err(err) => Ok(report_error(&err, format)),
    }
}

/// Log to stderr. `RUST_LOG` wins over the default level; `--verbose` wins over both.
fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Extract the output format from the `--json` flag.
pub fn get_format(matches: &ArgMatches) -> OutputFormat {
    OutputFormat::from_json_flag(matches.get_flag("json"))
}

/// Effective configuration: files and environment, then `--db`.
pub fn resolve_config(matches: &ArgMatches) -> Result<Config> {
    let explicit = matches.get_one::<String>("config").map(Path::new);
    let mut config = load_config(explicit)?;

    if let Some(db) = matches.get_one::<String>("db") {
        config.database.path = PathBuf::from(db);
        config.validate()?;
    }
    Ok(config)
}

async fn run_command(name: &str, sub_m: &ArgMatches, format: OutputFormat) -> Result<i32> {
    let config = resolve_config(sub_m)?;
    let ctx = CommandContext::open(config, format).await?;

    match name {
        "acquire" => handle_acquire(&ctx, sub_m).await,
        "release" => handle_release(&ctx, sub_m).await,
        "refresh" => handle_refresh(&ctx, sub_m).await,
        "holder" => inspect::run_holder(&ctx, required(sub_m, "key")?).await,
        "status" => inspect::run_status(&ctx, required(sub_m, "key")?).await,
        "count" => inspect::run_count(&ctx).await,
        "reset" => maintenance::run_reset(&ctx).await,
        "gc" => handle_gc(&ctx, sub_m).await,
        other => Err(anyhow!("Unknown command: {other}")),
    }
}

fn required<'a>(matches: &'a ArgMatches, id: &str) -> Result<&'a str> {
    matches
        .get_one::<String>(id)
        .map(String::as_str)
        .ok_or_else(|| anyhow!("{id} is required"))
}

fn timeout(matches: &ArgMatches) -> Result<i64> {
    matches
        .get_one::<i64>("timeout")
        .copied()
        .ok_or_else(|| anyhow!("timeout is required"))
}

fn default_context() -> String {
    format!("permitdb pid-{}", std::process::id())
}

async fn handle_acquire(ctx: &CommandContext, sub_m: &ArgMatches) -> Result<i32> {
    let options = AcquireOptions {
        key: required(sub_m, "key")?.to_string(),
        permits: sub_m
            .get_one::<u32>("permits")
            .copied()
            .ok_or_else(|| anyhow!("permits is required"))?,
        timeout_seconds: timeout(sub_m)?,
        context: sub_m
            .get_one::<String>("context")
            .cloned()
            .unwrap_or_else(default_context),
    };
    permit::run_acquire(ctx, &options).await
}

async fn handle_release(ctx: &CommandContext, sub_m: &ArgMatches) -> Result<i32> {
    permit::run_release(ctx, required(sub_m, "key")?, required(sub_m, "token")?).await
}

async fn handle_refresh(ctx: &CommandContext, sub_m: &ArgMatches) -> Result<i32> {
    permit::run_refresh(
        ctx,
        required(sub_m, "key")?,
        required(sub_m, "token")?,
        timeout(sub_m)?,
    )
    .await
}

async fn handle_gc(ctx: &CommandContext, sub_m: &ArgMatches) -> Result<i32> {
    let options = GcOptions {
        watch: sub_m.get_flag("watch"),
        interval_secs: sub_m.get_one::<u64>("interval").copied(),
    };
    maintenance::run_gc(ctx, options).await
}
