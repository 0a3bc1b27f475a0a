//! Store configuration
//!
//! Loaded from an optional `smartstore.toml` file.
//!
//! ## Environment Variables
//!
//! The following environment variables override config file settings:
//!
//! - `SMARTSTORE_FTS_EXTENSION` - `fts4` or `fts5`
//! - `SMARTSTORE_EXTERNAL_STORAGE_DIR` - Root directory for externally stored bodies
//! - `SMARTSTORE_CAPTURE_QUERY_PLAN` - `true` to record `EXPLAIN QUERY PLAN` output
//! - `SMARTSTORE_RESUME_ON_OPEN` - `false` to leave pending migrations alone on open
//!
//! These can be set in a `.env` file next to the config file.

use crate::error::{DbError, DbResult};
use crate::storage::FtsExtension;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration file name
pub const CONFIG_FILE_NAME: &str = "smartstore.toml";

/// Environment variable names
pub const ENV_FTS_EXTENSION: &str = "SMARTSTORE_FTS_EXTENSION";
pub const ENV_EXTERNAL_STORAGE_DIR: &str = "SMARTSTORE_EXTERNAL_STORAGE_DIR";
pub const ENV_CAPTURE_QUERY_PLAN: &str = "SMARTSTORE_CAPTURE_QUERY_PLAN";
pub const ENV_RESUME_ON_OPEN: &str = "SMARTSTORE_RESUME_ON_OPEN";

/// Store configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreConfig {
    /// Full-text module used for new full-text shadow tables
    #[serde(default)]
    pub fts_extension: FtsExtension,
    /// Root for externally stored bodies. Defaults to `<db stem>_external`
    /// next to the database file.
    #[serde(default)]
    pub external_storage_dir: Option<PathBuf>,
    /// Record `EXPLAIN QUERY PLAN` for every query
    #[serde(default)]
    pub capture_explain_query_plan: bool,
    /// Resume interrupted soup migrations when a store is opened
    #[serde(default = "default_true")]
    pub resume_long_operations_on_open: bool,
    /// Number of compiled Smart SQL statements kept in memory
    #[serde(default = "default_sql_cache_size")]
    pub sql_cache_size: usize,
}

fn default_true() -> bool {
    true
}

fn default_sql_cache_size() -> usize {
    256
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            fts_extension: FtsExtension::default(),
            external_storage_dir: None,
            capture_explain_query_plan: false,
            resume_long_operations_on_open: default_true(),
            sql_cache_size: default_sql_cache_size(),
        }
    }
}

impl StoreConfig {
    /// Load configuration from a directory
    ///
    /// This also loads any `.env` file in the directory and applies
    /// environment variable overrides. A missing config file yields defaults.
    pub fn load(dir: &Path) -> DbResult<Self> {
        let env_path = dir.join(".env");
        if env_path.exists() {
            dotenvy::from_path(&env_path)
                .map_err(|e| DbError::ConfigError(format!("{}: {}", env_path.display(), e)))?;
        }

        let config_path = dir.join(CONFIG_FILE_NAME);
        let mut config = if config_path.exists() {
            Self::from_file(&config_path)?
        } else {
            Self::default()
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Parse a TOML config file, without environment overrides
    pub fn from_file(path: &Path) -> DbResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
            .map_err(|e| DbError::ConfigError(format!("{}: {}", path.display(), e)))
    }

    pub fn from_toml(content: &str) -> DbResult<Self> {
        toml::from_str(content).map_err(|e| DbError::ConfigError(e.to_string()))
    }

    pub fn to_toml(&self) -> DbResult<String> {
        toml::to_string_pretty(self).map_err(|e| DbError::ConfigError(e.to_string()))
    }

    fn apply_env_overrides(&mut self) -> DbResult<()> {
        if let Ok(value) = std::env::var(ENV_FTS_EXTENSION) {
            self.fts_extension = FtsExtension::parse(&value)?;
        }
        if let Ok(value) = std::env::var(ENV_EXTERNAL_STORAGE_DIR) {
            if !value.is_empty() {
                self.external_storage_dir = Some(PathBuf::from(value));
            }
        }
        if let Ok(value) = std::env::var(ENV_CAPTURE_QUERY_PLAN) {
            self.capture_explain_query_plan = parse_bool(ENV_CAPTURE_QUERY_PLAN, &value)?;
        }
        if let Ok(value) = std::env::var(ENV_RESUME_ON_OPEN) {
            self.resume_long_operations_on_open = parse_bool(ENV_RESUME_ON_OPEN, &value)?;
        }
        Ok(())
    }

    /// External storage root for a database at `db_path`
    pub fn external_dir_for(&self, db_path: Option<&Path>) -> Option<PathBuf> {
        if let Some(dir) = &self.external_storage_dir {
            return Some(dir.clone());
        }
        let db_path = db_path?;
        let stem = db_path.file_stem()?.to_string_lossy();
        Some(db_path.with_file_name(format!("{}_external", stem)))
    }
}

fn parse_bool(key: &str, value: &str) -> DbResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(DbError::ConfigError(format!(
            "{} must be a boolean, got '{}'",
            key, other
        ))),
    }
}
