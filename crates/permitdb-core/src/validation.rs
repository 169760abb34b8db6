//! Argument checks run before any store access.

use chrono::Duration;

use crate::{
    slot::{MAX_CONTEXT_CHARS, MAX_PERMITS},
    Error, Result,
};

/// Reject an empty key.
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(Error::invalid_argument("Key cannot be null"));
    }
    Ok(())
}

/// Reject a blank or over-long context label.
pub fn validate_context(context: &str) -> Result<()> {
    if context.trim().is_empty() {
        return Err(Error::invalid_argument("Context cannot be null or empty"));
    }
    if context.chars().count() > MAX_CONTEXT_CHARS {
        return Err(Error::invalid_argument(format!(
            "Context length cannot be more than: {MAX_CONTEXT_CHARS}"
        )));
    }
    Ok(())
}

/// A key needs at least one slot and at most [`MAX_PERMITS`].
pub fn validate_max_permits(max_permits: u32) -> Result<()> {
    if max_permits == 0 {
        return Err(Error::invalid_argument("Max permits must be at least 1"));
    }
    if max_permits > MAX_PERMITS {
        return Err(Error::invalid_argument(format!(
            "Max permits cannot be more than: {MAX_PERMITS}"
        )));
    }
    Ok(())
}

/// Convert a lease length in seconds, rejecting negatives and overflow.
pub fn lease_duration(timeout_seconds: i64) -> Result<Duration> {
    if timeout_seconds < 0 {
        return Err(Error::invalid_argument("Timeout cannot be negative"));
    }
    Duration::try_seconds(timeout_seconds)
        .ok_or_else(|| Error::invalid_argument(format!("Timeout is too large: {timeout_seconds}")))
}
