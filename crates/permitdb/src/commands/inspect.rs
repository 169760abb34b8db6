//! Read-only views: holder, status, count.

use anyhow::Result;
use chrono::SecondsFormat;
use permitdb_core::SlotView;
use serde::Serialize;

use super::CommandContext;
use crate::{cli::EXIT_SUCCESS, output::print_json};

#[derive(Debug, Serialize)]
struct HolderOutput<'a> {
    key: &'a str,
    held: bool,
    context: Option<String>,
}

pub async fn run_holder(ctx: &CommandContext, key: &str) -> Result<i32> {
    let context = ctx.semaphore.get_first_unexpired_lock_context(key).await?;

    if ctx.format.is_json() {
        print_json(&HolderOutput {
            key,
            held: context.is_some(),
            context,
        })?;
    } else {
        match context {
            Some(context) => println!("{context}"),
            None => println!("no active holder"),
        }
    }
    Ok(EXIT_SUCCESS)
}

#[derive(Debug, Serialize)]
struct StatusOutput<'a> {
    key: &'a str,
    slots: &'a [SlotView],
}

fn render_slot(slot: &SlotView) -> String {
    let expires = slot.expires_on.map_or_else(
        || "-".to_string(),
        |at| at.to_rfc3339_opts(SecondsFormat::Secs, true),
    );
    let context = slot.context.as_deref().unwrap_or("-");
    format!(
        "{:>4}  {:<9}  {:<20}  {}",
        slot.slot_number,
        slot.state.to_string(),
        expires,
        context
    )
}

pub async fn run_status(ctx: &CommandContext, key: &str) -> Result<i32> {
    let slots = ctx.semaphore.slots(key).await?;

    if ctx.format.is_json() {
        print_json(&StatusOutput { key, slots: &slots })?;
        return Ok(EXIT_SUCCESS);
    }

    if slots.is_empty() {
        println!("No slots for '{key}'");
        return Ok(EXIT_SUCCESS);
    }

    println!("Slots for '{key}' ({}):", slots.len());
    println!("{:>4}  {:<9}  {:<20}  CONTEXT", "SLOT", "STATE", "EXPIRES");
    for slot in &slots {
        println!("{}", render_slot(slot));
    }
    Ok(EXIT_SUCCESS)
}

#[derive(Debug, Serialize)]
struct CountOutput {
    rows: i64,
}

pub async fn run_count(ctx: &CommandContext) -> Result<i32> {
    let rows = ctx.semaphore.get_lock_row_count().await?;

    if ctx.format.is_json() {
        print_json(&CountOutput { rows })?;
    } else {
        println!("{rows}");
    }
    Ok(EXIT_SUCCESS)
}
