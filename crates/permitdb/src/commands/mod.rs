//! Command implementations for the permitdb CLI
//!
//! - `permit`: acquire, release, refresh
//! - `inspect`: holder, status, count
//! - `maintenance`: reset, gc

use std::sync::Arc;

use anyhow::Result;
use permitdb_core::{Config, CountingSemaphore, SqliteSlotStore};

use crate::output::OutputFormat;

pub mod inspect;
pub mod maintenance;
pub mod permit;

/// Everything a command needs: the opened semaphore, the effective config,
/// and the output format.
#[derive(Debug)]
pub struct CommandContext {
    pub semaphore: Arc<CountingSemaphore<SqliteSlotStore>>,
    pub config: Config,
    pub format: OutputFormat,
}

impl CommandContext {
    /// Open the database named by `config` and build the semaphore.
    pub async fn open(config: Config, format: OutputFormat) -> Result<Self> {
        tracing::debug!(path = %config.database.path.display(), "Opening semaphore database");
        let store = SqliteSlotStore::open(&config.database).await?;
        let semaphore = CountingSemaphore::with_config(store, &config.semaphore);
        Ok(Self {
            semaphore: Arc::new(semaphore),
            config,
            format,
        })
    }
}
