//! # permitdb core
//!
//! A counting semaphore whose state lives in a shared `SQLite` database, so
//! independent processes can limit concurrent work per key without a
//! coordinator service.
//!
//! ## Laws (Compiler Enforced)
//!
//! - No `unwrap()` - returns `Result` instead
//! - No `expect()` - returns `Result` instead
//! - No `panic!()` - returns `Result` instead
//! - No `unsafe` - safe Rust only
//!
//! ## Transactions
//!
//! Semaphore state lives in its own database file, reached only through the
//! store's private pool. Every operation checks out one of those connections
//! and commits before returning, so a caller's business transaction never
//! contains a semaphore write: acquire, release and refresh succeed while that
//! transaction holds its own write lock, and survive its rollback.
//!
//! Keep application tables out of the semaphore file. `SQLite` has one writer
//! per file, and a caller transaction writing there would make semaphore
//! writes wait up to the busy timeout.
//!
//! ## Example
//!
//! ```no_run
//! use permitdb_core::{CountingSemaphore, DatabaseConfig, SqliteSlotStore};
//!
//! # async fn demo() -> permitdb_core::Result<()> {
//! let store = SqliteSlotStore::open(&DatabaseConfig::default()).await?;
//! let semaphore = CountingSemaphore::new(store);
//!
//! if let Some(token) = semaphore
//!     .attempt_to_acquire_lock("reports", 60, 4, "nightly export")
//!     .await?
//! {
//!     // ... bounded work ...
//!     semaphore.release_lock("reports", token.as_str()).await?;
//! }
//! # Ok(())
//! # }
//! ```

#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::panic))]
#![forbid(unsafe_code)]

pub mod clock;
pub mod config;
mod error;
pub mod gc;
pub mod semaphore;
pub mod slot;
pub mod store;
pub mod validation;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{load_config, Config, DatabaseConfig, GcConfig, SemaphoreConfig};
pub use error::{Error, Result};
pub use gc::{GarbageCollector, GcSummary};
pub use semaphore::CountingSemaphore;
pub use slot::{LockToken, Slot, SlotState, SlotView, MAX_CONTEXT_CHARS, MAX_PERMITS};
pub use store::{SlotClaim, SlotStore, SqliteSlotStore};
