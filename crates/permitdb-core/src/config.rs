//! Configuration loading and management
//!
//! # Hierarchy
//!
//! Configuration is loaded in this order (later overrides earlier):
//! 1. Built-in defaults
//! 2. Global config: `<config dir>/permitdb/config.toml`
//! 3. Explicit config file (`--config`)
//! 4. Environment variables: `PERMITDB_*`
//! 5. CLI flags (applied by the binary)
//!
//! # Example Config
//!
//! ```toml
//! [database]
//! path = "/var/lib/permitdb/permits.sqlite3"
//! max_connections = 8
//! busy_timeout_ms = 5000
//!
//! [semaphore]
//! grace_period_secs = 300
//!
//! [gc]
//! interval_secs = 60
//! ```

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Default retention window between release and eligibility for deletion.
pub const DEFAULT_GRACE_PERIOD_SECS: i64 = 300;

// ═══════════════════════════════════════════════════════════════════════════
// CONFIGURATION STRUCTURES
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub database: DatabaseConfig,
    pub semaphore: SemaphoreConfig,
    pub gc: GcConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub max_connections: u32,
    pub busy_timeout_ms: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SemaphoreConfig {
    pub grace_period_secs: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct GcConfig {
    pub interval_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("permitdb.sqlite3"),
            max_connections: 8,
            busy_timeout_ms: 5_000,
        }
    }
}

impl Default for SemaphoreConfig {
    fn default() -> Self {
        Self {
            grace_period_secs: DEFAULT_GRACE_PERIOD_SECS,
        }
    }
}

impl Default for GcConfig {
    fn default() -> Self {
        Self { interval_secs: 60 }
    }
}

impl DatabaseConfig {
    pub const fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

impl SemaphoreConfig {
    pub fn grace_period(&self) -> chrono::Duration {
        chrono::Duration::try_seconds(self.grace_period_secs).unwrap_or_else(chrono::Duration::zero)
    }
}

impl GcConfig {
    pub const fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// PARTIAL (FILE) CONFIGURATION
// ═══════════════════════════════════════════════════════════════════════════

/// A config file as written: every field optional, merged over defaults.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(default)]
    pub database: DatabaseFile,
    #[serde(default)]
    pub semaphore: SemaphoreFile,
    #[serde(default)]
    pub gc: GcFile,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct DatabaseFile {
    pub path: Option<PathBuf>,
    pub max_connections: Option<u32>,
    pub busy_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SemaphoreFile {
    pub grace_period_secs: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct GcFile {
    pub interval_secs: Option<u64>,
}

impl Config {
    /// Overlay a config file (file values win) - immutable pattern
    pub fn merge(self, file: ConfigFile) -> Self {
        Self {
            database: DatabaseConfig {
                path: file.database.path.unwrap_or(self.database.path),
                max_connections: file
                    .database
                    .max_connections
                    .unwrap_or(self.database.max_connections),
                busy_timeout_ms: file
                    .database
                    .busy_timeout_ms
                    .unwrap_or(self.database.busy_timeout_ms),
            },
            semaphore: SemaphoreConfig {
                grace_period_secs: file
                    .semaphore
                    .grace_period_secs
                    .unwrap_or(self.semaphore.grace_period_secs),
            },
            gc: GcConfig {
                interval_secs: file.gc.interval_secs.unwrap_or(self.gc.interval_secs),
            },
        }
    }

    /// Apply `PERMITDB_*` environment overrides.
    pub fn apply_env_vars(mut self) -> Result<Self> {
        if let Ok(value) = std::env::var("PERMITDB_DB_PATH") {
            if value.is_empty() {
                return Err(Error::invalid_config(
                    "PERMITDB_DB_PATH cannot be empty - unset the variable or provide a path",
                ));
            }
            self.database.path = PathBuf::from(value);
        }

        if let Ok(value) = std::env::var("PERMITDB_MAX_CONNECTIONS") {
            self.database.max_connections = value.parse().map_err(|e| {
                Error::invalid_config(format!("Invalid PERMITDB_MAX_CONNECTIONS value: {e}"))
            })?;
        }

        if let Ok(value) = std::env::var("PERMITDB_BUSY_TIMEOUT_MS") {
            self.database.busy_timeout_ms = value.parse().map_err(|e| {
                Error::invalid_config(format!("Invalid PERMITDB_BUSY_TIMEOUT_MS value: {e}"))
            })?;
        }

        if let Ok(value) = std::env::var("PERMITDB_GRACE_PERIOD_SECS") {
            self.semaphore.grace_period_secs = value.parse().map_err(|e| {
                Error::invalid_config(format!("Invalid PERMITDB_GRACE_PERIOD_SECS value: {e}"))
            })?;
        }

        if let Ok(value) = std::env::var("PERMITDB_GC_INTERVAL_SECS") {
            self.gc.interval_secs = value.parse().map_err(|e| {
                Error::invalid_config(format!("Invalid PERMITDB_GC_INTERVAL_SECS value: {e}"))
            })?;
        }

        Ok(self)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<()> {
        if self.database.path.as_os_str().is_empty() {
            return Err(Error::invalid_config("database.path cannot be empty"));
        }
        // One connection for a caller's own transaction, one for the independent unit of work.
        if self.database.max_connections < 2 {
            return Err(Error::invalid_config(format!(
                "database.max_connections must be at least 2, got {}",
                self.database.max_connections
            )));
        }
        if self.semaphore.grace_period_secs < 0 {
            return Err(Error::invalid_config(format!(
                "semaphore.grace_period_secs cannot be negative, got {}",
                self.semaphore.grace_period_secs
            )));
        }
        if chrono::Duration::try_seconds(self.semaphore.grace_period_secs).is_none() {
            return Err(Error::invalid_config(
                "semaphore.grace_period_secs is out of range",
            ));
        }
        if self.gc.interval_secs == 0 {
            return Err(Error::invalid_config("gc.interval_secs must be at least 1"));
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// LOADING
// ═══════════════════════════════════════════════════════════════════════════

/// Load configuration from all sources with hierarchy.
///
/// # Errors
///
/// Returns error if:
/// - A config file is malformed TOML or has unknown keys
/// - An explicit config file does not exist
/// - An environment override does not parse
/// - Values fail validation
pub fn load_config(explicit: Option<&Path>) -> Result<Config> {
    let config = Config::default();

    let config = match global_config_path() {
        Some(global_path) if global_path.is_file() => config.merge(load_toml_file(&global_path)?),
        _ => config,
    };

    let config = match explicit {
        Some(path) => config.merge(load_toml_file(path)?),
        None => config,
    };

    let config = config.apply_env_vars()?;
    config.validate()?;
    Ok(config)
}

/// Get path to global config file
pub fn global_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "permitdb")
        .map(|proj_dirs| proj_dirs.config_dir().join("config.toml"))
}

/// Parse one TOML config file.
pub fn load_toml_file(path: &Path) -> Result<ConfigFile> {
    if path.is_dir() {
        return Err(Error::invalid_config(format!(
            "Config path is a directory, not a file: {}",
            path.display()
        )));
    }
    let content = std::fs::read_to_string(path)?;
    let file: ConfigFile = toml::from_str(&content)?;
    Ok(file)
}
