//! Runtime configuration
//!
//! Loaded from an optional TOML file, then overridden by `CDD_*` environment
//! variables:
//!
//! | Variable                      | Field                          |
//! |-------------------------------|--------------------------------|
//! | `CDD_DATABASE_PATH`           | `database_path`                |
//! | `CDD_DOCUMENT_BACKEND`        | `document_backend`             |
//! | `CDD_DOCUMENT_STORE_PATH`     | `document_store_path`          |
//! | `CDD_MIRROR_COLLECTION`       | `mirror_collection`            |
//! | `CDD_COMPLETION_CACHE_TTL`    | `completion_cache_ttl_secs`    |
//! | `CDD_EXCLUDED_USERNAMES`      | `excluded_username_markers` (comma separated) |

use crate::services::{DEFAULT_EXCLUDED_USERNAME_MARKERS, DEFAULT_MIRROR_COLLECTION};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Which document store implementation backs agent and mirror collections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentBackend {
    /// Embedded SurrealDB on RocksDB
    Surreal,
    /// Process-local, nothing persisted
    Memory,
}

impl FromStr for DocumentBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "surreal" | "surrealdb" => Ok(Self::Surreal),
            "memory" => Ok(Self::Memory),
            other => Err(ConfigError::InvalidValue {
                key: "document_backend".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CddConfig {
    /// libsql database file
    pub database_path: PathBuf,
    pub document_backend: DocumentBackend,
    /// RocksDB directory of the SurrealDB backend
    pub document_store_path: PathBuf,
    /// Collection holding the geography mirror
    pub mirror_collection: String,
    pub completion_cache_ttl_secs: u64,
    /// Usernames containing one of these are left out of diagnostics
    pub excluded_username_markers: Vec<String>,
}

impl Default for CddConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("data/cdd.db"),
            document_backend: DocumentBackend::Surreal,
            document_store_path: PathBuf::from("data/documents"),
            mirror_collection: DEFAULT_MIRROR_COLLECTION.to_string(),
            completion_cache_ttl_secs: 3600,
            excluded_username_markers: DEFAULT_EXCLUDED_USERNAME_MARKERS
                .iter()
                .map(|m| m.to_string())
                .collect(),
        }
    }
}

impl CddConfig {
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults, then `path` if given, then the process environment
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;
                toml::from_str(&content)?
            }
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;

        tracing::debug!(?config, "Loaded configuration");
        Ok(config)
    }

    /// Apply `CDD_*` overrides read through `lookup`
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("CDD_DATABASE_PATH") {
            self.database_path = PathBuf::from(value);
        }
        if let Some(value) = lookup("CDD_DOCUMENT_BACKEND") {
            self.document_backend = value.parse()?;
        }
        if let Some(value) = lookup("CDD_DOCUMENT_STORE_PATH") {
            self.document_store_path = PathBuf::from(value);
        }
        if let Some(value) = lookup("CDD_MIRROR_COLLECTION") {
            self.mirror_collection = value;
        }
        if let Some(value) = lookup("CDD_COMPLETION_CACHE_TTL") {
            self.completion_cache_ttl_secs =
                value.trim().parse().map_err(|_| ConfigError::InvalidValue {
                    key: "CDD_COMPLETION_CACHE_TTL".to_string(),
                    value: value.clone(),
                })?;
        }
        if let Some(value) = lookup("CDD_EXCLUDED_USERNAMES") {
            self.excluded_username_markers = value
                .split(',')
                .map(str::trim)
                .filter(|marker| !marker.is_empty())
                .map(str::to_string)
                .collect();
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mirror_collection.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "mirror_collection must not be empty".to_string(),
            ));
        }
        if crate::db::Collection::new(&self.mirror_collection).is_err() {
            return Err(ConfigError::InvalidValue {
                key: "mirror_collection".to_string(),
                value: self.mirror_collection.clone(),
            });
        }
        if self.database_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid(
                "database_path must not be empty".to_string(),
            ));
        }
        if self.document_backend == DocumentBackend::Surreal
            && self.document_store_path.as_os_str().is_empty()
        {
            return Err(ConfigError::Invalid(
                "document_store_path is required for the surreal backend".to_string(),
            ));
        }
        Ok(())
    }

    pub fn completion_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.completion_cache_ttl_secs)
    }
}
