//! Slot state model.
//!
//! One row exists per `(key, slot_number)`. A slot moves through:
//! bootstrapped (no token, no expiry) -> held (token, lease end) ->
//! released (no token, grace end) or stale (token, lease end in the past) ->
//! deleted by garbage collection once released and past the grace window.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Longest context label a holder may attach to a slot, in characters.
pub const MAX_CONTEXT_CHARS: usize = 256;

/// Most slots a single key may have. Slots are created eagerly, one row each.
pub const MAX_PERMITS: u32 = 100_000;

/// Opaque capability proving ownership of one acquired slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LockToken(String);

impl LockToken {
    /// Mint a fresh random token.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    /// Borrow the token text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume into the token text.
    pub fn into_inner(self) -> String {
        self.0
    }

    /// Short prefix safe to put in logs.
    pub fn redacted(&self) -> String {
        let prefix: String = self.0.chars().take(6).collect();
        format!("{prefix}…")
    }
}

impl fmt::Display for LockToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for LockToken {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<String> for LockToken {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Derived state of a slot at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotState {
    /// No token. Claimable.
    Available,
    /// Token present and lease not yet over.
    Held,
    /// Token present but lease over. Claimable in place, never garbage collected.
    Stale,
}

impl SlotState {
    /// Whether an acquirer may claim a slot in this state.
    pub const fn is_claimable(self) -> bool {
        matches!(self, Self::Available | Self::Stale)
    }
}

impl fmt::Display for SlotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Available => write!(f, "available"),
            Self::Held => write!(f, "held"),
            Self::Stale => write!(f, "stale"),
        }
    }
}

/// A persisted slot row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    pub key: String,
    pub slot_number: u32,
    pub token: Option<LockToken>,
    /// Lease end while held; garbage-collection eligibility time once released.
    pub expires_on: Option<DateTime<Utc>>,
    pub context: Option<String>,
    pub created_on: DateTime<Utc>,
}

impl Slot {
    /// Classify this slot at `now`.
    pub fn state_at(&self, now: DateTime<Utc>) -> SlotState {
        match (&self.token, self.expires_on) {
            (None, _) => SlotState::Available,
            (Some(_), Some(expires_on)) if expires_on < now => SlotState::Stale,
            (Some(_), _) => SlotState::Held,
        }
    }

    /// Released (or reset) and past its grace window.
    pub fn is_gc_eligible(&self, now: DateTime<Utc>) -> bool {
        self.token.is_none() && self.expires_on.is_some_and(|expires_on| expires_on < now)
    }

    /// Operator-facing view. The token never leaves the store through here.
    pub fn view(&self, now: DateTime<Utc>) -> SlotView {
        SlotView {
            key: self.key.clone(),
            slot_number: self.slot_number,
            state: self.state_at(now),
            expires_on: self.expires_on,
            context: self.context.clone(),
            created_on: self.created_on,
        }
    }
}

/// Diagnostic projection of a slot without its token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotView {
    pub key: String,
    pub slot_number: u32,
    pub state: SlotState,
    pub expires_on: Option<DateTime<Utc>>,
    pub context: Option<String>,
    pub created_on: DateTime<Utc>,
}
