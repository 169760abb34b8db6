//! Error types for permitdb with categorization:
//!
//! - **Validation errors**: caller arguments and configuration (exit code 1)
//! - **System errors**: store, IO (exit code 2)
//! - **Ownership errors**: release/refresh with a token that is no longer held (exit code 4)
//!
//! Running out of permits is not an error: acquisition returns `None` instead.

use thiserror::Error;

/// Top-level error type for every permitdb operation.
#[derive(Debug, Error)]
pub enum Error {
    /// A caller argument failed validation. Raised before the store is touched.
    #[error("{0}")]
    InvalidArgument(String),

    /// The slot for `(key, token)` is gone: wrong token, already released,
    /// reset, or reclaimed by another holder after the lease lapsed.
    #[error("Lock release failed: key '{key}' has no slot held by the given token")]
    LockReleaseFailed { key: String },

    /// Store failure, passed through as the driver reported it.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Configuration failed validation.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration file could not be parsed.
    #[error("Parse error: {0}")]
    Parse(String),

    /// IO failure (config files, database directory).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create an invalid-argument error.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create an ownership failure for `key`.
    pub fn lock_release_failed(key: impl Into<String>) -> Self {
        Self::LockReleaseFailed { key: key.into() }
    }

    /// Create a configuration error.
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Stable machine-readable code for this error.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "INVALID_ARGUMENT",
            Self::LockReleaseFailed { .. } => "LOCK_RELEASE_FAILED",
            Self::Database(_) => "DATABASE_ERROR",
            Self::InvalidConfig(_) => "INVALID_CONFIG",
            Self::Parse(_) => "PARSE_ERROR",
            Self::Io(_) => "IO_ERROR",
        }
    }

    /// Returns the process exit code for this error.
    ///
    /// Exit code scheme:
    /// - 1: User error (invalid argument, bad configuration)
    /// - 2: System error (store, IO)
    /// - 4: Invalid state (token no longer owns its slot)
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::InvalidArgument(_) | Self::InvalidConfig(_) | Self::Parse(_) => 1,
            Self::Database(_) | Self::Io(_) => 2,
            Self::LockReleaseFailed { .. } => 4,
        }
    }

    /// True when the caller passed bad input rather than hitting a runtime failure.
    pub const fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidArgument(_) | Self::InvalidConfig(_) | Self::Parse(_)
        )
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::Parse(format!("Failed to parse config: {err}"))
    }
}

/// Result type alias for permitdb operations.
pub type Result<T> = std::result::Result<T, Error>;
